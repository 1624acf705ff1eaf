use ssrhost_core::RenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot read engine module {path}: {source}")]
    ModuleUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation failed: {0}")]
    CompilationFailed(String),

    #[error("linking failed: {0}")]
    LinkFailed(String),

    #[error("entry point '{0}' is not exported as a function")]
    EntryPointMissing(String),

    #[error("entry point '{0}' must take no arguments and return nothing or an i32 status")]
    EntryPointSignature(String),

    #[error("instantiation failed: {0}")]
    InstantiationFailed(String),

    #[error("engine trapped: {0}")]
    Trapped(String),

    #[error("fuel budget of {0} exhausted")]
    FuelExhausted(u64),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RuntimeError> for RenderError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Trapped(msg) => RenderError::Trapped(msg),
            RuntimeError::FuelExhausted(budget) => RenderError::FuelExhausted(budget),
            other => RenderError::EngineSetup(other.to_string()),
        }
    }
}
