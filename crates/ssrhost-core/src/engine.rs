use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::RenderError;
use crate::payload::RenderResult;

/// Raw outcome of one engine call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Exit status; anything but 0 is a failed render.
    pub status: i32,
    pub output: Vec<u8>,
    /// Diagnostics written by the engine, kept for error reporting.
    pub stderr: Vec<u8>,
}

impl Invocation {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 0,
            output: output.into(),
            stderr: Vec::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            output: Vec::new(),
            stderr: stderr.into(),
        }
    }
}

/// The rendering engine boundary.
///
/// Takes the encoded payload and returns whatever the engine produced.
/// Implementations must not share mutable state between calls, and the
/// returned future must yield regularly so a dropped or timed-out request
/// stops the call.
pub trait Engine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn invoke<'a>(
        &'a self,
        input: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Invocation, RenderError>> + Send + 'a>>;
}

#[derive(Deserialize)]
struct MarkupOnly {
    markup: String,
}

/// Engine that renders every page as its own markup.
///
/// Useful for wiring checks and tests: no element is expanded.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEngine;

impl Engine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn invoke<'a>(
        &'a self,
        input: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Invocation, RenderError>> + Send + 'a>> {
        Box::pin(async move {
            let payload: MarkupOnly = match serde_json::from_slice(input) {
                Ok(p) => p,
                Err(e) => return Ok(Invocation::failure(1, format!("invalid payload: {e}"))),
            };
            let result = RenderResult {
                document: payload.markup,
            };
            let output = serde_json::to_vec(&result)
                .map_err(|e| RenderError::Trapped(format!("echo engine: {e}")))?;
            Ok(Invocation::success(output))
        })
    }
}

const MAX_DETAIL_BYTES: usize = 512;

/// Turn a non-zero exit status into [`RenderError::CallFailed`].
pub(crate) fn check_status(invocation: &Invocation) -> Result<(), RenderError> {
    if invocation.status == 0 {
        return Ok(());
    }
    Err(RenderError::CallFailed {
        status: invocation.status,
        detail: diagnostic_tail(&invocation.stderr),
    })
}

fn diagnostic_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "(no diagnostics)".into();
    }
    if text.len() <= MAX_DETAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - MAX_DETAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_markup_as_document() {
        let input = br#"{"markup": "<p>hi</p>", "elements": {}, "initialState": {}}"#;
        let invocation = EchoEngine.invoke(input).await.unwrap();
        assert_eq!(invocation.status, 0);
        assert_eq!(invocation.output, br#"{"document":"<p>hi</p>"}"#);
    }

    #[tokio::test]
    async fn echo_fails_with_status_on_garbage() {
        let invocation = EchoEngine.invoke(b"garbage").await.unwrap();
        assert_eq!(invocation.status, 1);
        assert!(String::from_utf8_lossy(&invocation.stderr).contains("invalid payload"));
    }

    #[test]
    fn zero_status_passes() {
        assert!(check_status(&Invocation::success("{}")).is_ok());
    }

    #[test]
    fn non_zero_status_carries_code_and_stderr() {
        let err = check_status(&Invocation::failure(7, "  element not found: x-missing\n"))
            .unwrap_err();
        match err {
            RenderError::CallFailed { status, detail } => {
                assert_eq!(status, 7);
                assert_eq!(detail, "element not found: x-missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_stderr_is_reported_as_such() {
        let err = check_status(&Invocation::failure(-1, "")).unwrap_err();
        assert!(err.to_string().contains("(no diagnostics)"));
    }

    #[test]
    fn long_stderr_keeps_the_tail() {
        let mut stderr = "x".repeat(2000);
        stderr.push_str("final line");
        let detail = diagnostic_tail(stderr.as_bytes());
        assert!(detail.starts_with("..."));
        assert!(detail.ends_with("final line"));
        assert!(detail.len() <= MAX_DETAIL_BYTES + 3);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let stderr = "é".repeat(400);
        let detail = diagnostic_tail(stderr.as_bytes());
        assert!(detail.ends_with('é'));
    }
}
