use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to initialize engine: {0}")]
    EngineSetup(String),

    #[error("failed to create payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("engine call failed, exit code: {status}: {detail}")]
    CallFailed { status: i32, detail: String },

    #[error("engine trapped: {0}")]
    Trapped(String),

    #[error("engine exhausted its fuel budget of {0}")]
    FuelExhausted(u64),

    /// `budget` is the time the call had between starting and its deadline.
    #[error("engine call exceeded its deadline ({budget:?} allowed)")]
    DeadlineExceeded { budget: Duration },

    #[error("failed to parse render results: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RenderError {
    /// The engine's exit status, when the failure came from a completed call.
    pub fn status(&self) -> Option<i32> {
        match self {
            RenderError::CallFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
