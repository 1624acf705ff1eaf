//! HTTP front end for ssrhost.
//!
//! One route: `GET /` renders the configured page through the engine and
//! returns the document as HTML. Any failure along the way becomes a 500
//! with a fixed body; the details only go to the log.

pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use ssrhost_core::{EchoEngine, ElementTable, Engine, Payload, Renderer};
use ssrhost_runtime::{ExtismEngine, RuntimeError, WasmEngine};

use crate::config::{EngineConfig, EngineKind, PageConfig};

pub const RENDER_FAILED_BODY: &str = "Failed to render document";

/// Everything a request needs. Cloned per request; all fields are shared.
#[derive(Clone)]
pub struct AppState {
    renderer: Renderer,
    elements: Arc<ElementTable>,
    page: Arc<PageConfig>,
}

impl AppState {
    pub fn new(renderer: Renderer, elements: Arc<ElementTable>, page: PageConfig) -> Self {
        Self {
            renderer,
            elements,
            page: Arc::new(page),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn elements(&self) -> &Arc<ElementTable> {
        &self.elements
    }

    /// Build the payload for one request.
    pub fn payload(&self) -> Payload {
        Payload::new(
            self.page.markup.clone(),
            self.elements.clone(),
            self.page.initial_state.clone(),
        )
    }
}

async fn render_handler(State(state): State<AppState>) -> Response {
    let payload = state.payload();
    match state.renderer.render(&payload).await {
        Ok(result) => Html(result.document).into_response(),
        Err(e) => {
            tracing::error!(
                engine = state.renderer.engine_name(),
                status = ?e.status(),
                "Failed to render document: {e}"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILED_BODY).into_response()
        }
    }
}

/// Build the HTTP router with the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(render_handler))
        .with_state(state)
}

/// Create the configured engine and wrap it in a [`Renderer`].
///
/// A WASM module that fails to load here is only logged: the server still
/// starts and each render retries the load.
pub async fn build_renderer(config: &EngineConfig) -> Result<Renderer, RuntimeError> {
    let engine: Arc<dyn Engine> = match config.kind {
        EngineKind::Echo => Arc::new(EchoEngine),
        EngineKind::Extism => {
            let engine = ExtismEngine::new(config.wasm.clone(), config.timeout());
            warn_if_unloaded(config, engine.preload().await);
            Arc::new(engine)
        }
        EngineKind::Wasm => {
            let engine = WasmEngine::new(config.wasm.clone())?;
            warn_if_unloaded(config, engine.preload().await);
            Arc::new(engine)
        }
    };

    let renderer = Renderer::new(engine);
    Ok(match config.timeout() {
        Some(timeout) => renderer.with_timeout(timeout),
        None => renderer,
    })
}

fn warn_if_unloaded(config: &EngineConfig, preloaded: Result<(), RuntimeError>) {
    if let Err(e) = preloaded {
        tracing::warn!(
            kind = ?config.kind,
            module = %config.wasm.module.display(),
            "Engine module not loaded, renders will fail until it is: {e}"
        );
    }
}

/// Resolve when the process is asked to stop.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
