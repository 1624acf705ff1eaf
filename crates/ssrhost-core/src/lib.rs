//! Host side of the ssrhost render protocol.
//!
//! The host never interprets pages itself. It gathers element sources into
//! an [`ElementTable`], wraps them with page markup and initial state in a
//! [`Payload`], encodes that to JSON and hands the bytes to an [`Engine`].
//! The engine answers with `{"document": "..."}`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssrhost_core::{EchoEngine, ElementTable, Payload, Renderer};
//!
//! # async fn run() -> Result<(), ssrhost_core::RenderError> {
//! let elements = Arc::new(ElementTable::from_dir("elements"));
//! let renderer = Renderer::new(Arc::new(EchoEngine));
//!
//! let payload = Payload::new("<my-header>Hi</my-header>", elements, serde_json::json!({}));
//! let result = renderer.render(&payload).await?;
//! println!("{}", result.document);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod elements;
pub mod engine;
pub mod error;
pub mod payload;
pub mod render;

pub use elements::{AssetEntry, AssetSource, DirSource, ElementTable, load_elements};
pub use engine::{EchoEngine, Engine, Invocation};
pub use error::RenderError;
pub use payload::{Payload, RenderResult};
pub use render::Renderer;
