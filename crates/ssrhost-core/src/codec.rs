//! Byte-level contract with the engine.
//!
//! The payload is JSON with four-space indentation and no trailing newline.
//! `<`, `>` and `&` are written as-is: markup and element sources are HTML,
//! and the engine must see them exactly as authored.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::RenderError;
use crate::payload::{Payload, RenderResult};

const INDENT: &[u8] = b"    ";

/// Serialize a payload into the bytes handed to the engine.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::with_capacity(payload.markup.len() + 256);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    payload
        .serialize(&mut serializer)
        .map_err(RenderError::Encode)?;
    Ok(buf)
}

/// Parse engine output. Anything but `{"document": "<string>"}` is an error.
pub fn decode_result(output: &[u8]) -> Result<RenderResult, RenderError> {
    serde_json::from_slice(output).map_err(RenderError::Decode)
}
