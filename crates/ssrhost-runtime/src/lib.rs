//! Sandboxed Wasmtime runtime for the ssrhost rendering engine.
//!
//! Provides two [`ssrhost_core::Engine`]s:
//!
//! - [`ExtismEngine`] runs an Extism plugin such as `enhance-ssr.wasm`.
//! - [`WasmEngine`] runs a WASI preview1 command module with the payload on
//!   stdin and the result on stdout.
//!
//! Either way the module is compiled once and each render gets a fresh
//! instance with its own memory and fuel budget.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssrhost_core::Renderer;
//! use ssrhost_runtime::{WasmEngine, WasmEngineConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = WasmEngine::new(WasmEngineConfig {
//!     module: "enhance-ssr.wasm".into(),
//!     ..Default::default()
//! })?;
//! engine.preload().await?;
//!
//! let renderer = Renderer::new(Arc::new(engine));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extism_engine;
pub mod invoker;
pub mod runtime_context;
pub mod storage;
pub mod wasistate;

pub use error::RuntimeError;
pub use extism_engine::{DEFAULT_EXTISM_FUNCTION, ExtismEngine};
pub use invoker::{DEFAULT_WASI_ENTRY_POINT, WasmEngine, WasmEngineConfig};
pub use storage::ModuleCache;
