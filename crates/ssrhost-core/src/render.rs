use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::codec::{decode_result, encode_payload};
use crate::engine::{Engine, check_status};
use crate::error::RenderError;
use crate::payload::{Payload, RenderResult};

/// Encode → invoke → decode, with an optional per-call timeout.
///
/// Cheap to clone; every clone shares the same engine. Holds no
/// per-request state, so one `Renderer` serves any number of concurrent
/// requests.
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<dyn Engine>,
    timeout: Option<Duration>,
}

impl Renderer {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            timeout: None,
        }
    }

    /// Bound every engine call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Render using the configured timeout, counted from now.
    pub async fn render(&self, payload: &Payload) -> Result<RenderResult, RenderError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        self.render_with_deadline(payload, deadline).await
    }

    /// Render with an explicit deadline.
    ///
    /// A deadline already in the past fails without touching the engine.
    /// Dropping the returned future abandons the engine call.
    pub async fn render_with_deadline(
        &self,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> Result<RenderResult, RenderError> {
        let started = Instant::now();
        let expired = |deadline: Instant| RenderError::DeadlineExceeded {
            budget: deadline.saturating_duration_since(started),
        };
        if let Some(deadline) = deadline.filter(|d| *d <= started) {
            return Err(expired(deadline));
        }

        let input = encode_payload(payload)?;
        tracing::debug!(
            engine = self.engine.name(),
            bytes = input.len(),
            elements = payload.elements.len(),
            "Invoking engine"
        );

        let call = self.engine.invoke(&input);
        let invocation = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| expired(deadline))??,
            None => call.await?,
        };

        if !invocation.stderr.is_empty() {
            tracing::debug!(
                engine = self.engine.name(),
                stderr = %String::from_utf8_lossy(&invocation.stderr),
                "Engine diagnostics"
            );
        }
        check_status(&invocation)?;

        let result = decode_result(&invocation.output)?;
        tracing::debug!(
            engine = self.engine.name(),
            bytes = result.document.len(),
            "Render complete"
        );
        Ok(result)
    }
}
