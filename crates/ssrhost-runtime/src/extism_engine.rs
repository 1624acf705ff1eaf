use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use extism::{CancelHandle, CompiledPlugin, Manifest, Plugin, PluginBuilder, Wasm};
use ssrhost_core::{Engine, Invocation, RenderError};
use tokio::sync::OnceCell;

use crate::error::RuntimeError;
use crate::invoker::WasmEngineConfig;
use crate::storage;

/// Plugin function called by [`ExtismEngine`] when none is configured.
pub const DEFAULT_EXTISM_FUNCTION: &str = "ssr";

const WASM_PAGE_BYTES: usize = 64 * 1024;

/// Rendering engine backed by an Extism plugin such as `enhance-ssr.wasm`.
///
/// The encoded payload is the plugin input and the plugin output is the
/// result. A non-zero return code from the plugin function is the exit
/// status; whatever the plugin passed to `error_set` becomes the
/// diagnostics.
///
/// The plugin is compiled once, on first use, and a failed load is retried
/// by the next render. Every call instantiates its own plugin and runs it
/// on a blocking thread. Dropping the call future cancels the plugin.
pub struct ExtismEngine {
    config: WasmEngineConfig,
    function: String,
    timeout: Option<Duration>,
    compiled: OnceCell<Arc<CompiledPlugin>>,
}

impl ExtismEngine {
    /// `timeout` is enforced inside the plugin as well, so a runaway call
    /// stops even when nobody waits for it anymore.
    pub fn new(config: WasmEngineConfig, timeout: Option<Duration>) -> Self {
        let function = config.entry_point_or(DEFAULT_EXTISM_FUNCTION).to_string();
        Self {
            config,
            function,
            timeout,
            compiled: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &WasmEngineConfig {
        &self.config
    }

    /// Compile the plugin now instead of on the first render.
    pub async fn preload(&self) -> Result<(), RuntimeError> {
        self.compiled().await.map(|_| ())
    }

    async fn compiled(&self) -> Result<Arc<CompiledPlugin>, RuntimeError> {
        self.compiled.get_or_try_init(|| self.load()).await.cloned()
    }

    async fn load(&self) -> Result<Arc<CompiledPlugin>, RuntimeError> {
        let path = self.config.module.clone();
        let function = self.function.clone();
        let fuel = self.config.fuel_per_call;
        let memory_pages = u32::try_from(self.config.max_memory_bytes / WASM_PAGE_BYTES)
            .unwrap_or(u32::MAX);
        let timeout = self.timeout;
        let started = Instant::now();

        tracing::info!(path = %path.display(), function = %function, "Loading Extism plugin");

        let compiled = tokio::task::spawn_blocking(move || -> Result<CompiledPlugin, RuntimeError> {
            let bytes = storage::read_module(&path)?;

            let mut manifest = Manifest::new([Wasm::data(bytes)]).with_memory_max(memory_pages);
            if let Some(timeout) = timeout {
                manifest = manifest.with_timeout(timeout);
            }
            let builder = PluginBuilder::new(manifest)
                .with_wasi(true)
                .with_fuel_limit(fuel);

            let compiled = CompiledPlugin::new(builder).map_err(|e| {
                RuntimeError::CompilationFailed(format!("{}: {e:#}", path.display()))
            })?;

            let plugin = Plugin::new_from_compiled(&compiled)
                .map_err(|e| RuntimeError::LinkFailed(format!("{}: {e:#}", path.display())))?;
            if !plugin.function_exists(&function) {
                return Err(RuntimeError::EntryPointMissing(function));
            }
            Ok(compiled)
        })
        .await
        .map_err(|e| RuntimeError::CompilationFailed(format!("compile task failed: {e}")))??;

        tracing::info!(
            path = %self.config.module.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extism plugin ready"
        );
        Ok(Arc::new(compiled))
    }

    /// Run the plugin function once in a fresh plugin instance.
    pub async fn call(&self, input: &[u8]) -> Result<Invocation, RuntimeError> {
        let plugin = {
            let compiled = self.compiled().await?;
            Plugin::new_from_compiled(&compiled)
                .map_err(|e| RuntimeError::InstantiationFailed(format!("{e:#}")))?
        };

        let guard = CancelOnDrop(Some(plugin.cancel_handle()));
        let function = self.function.clone();
        let input = input.to_vec();
        let started = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut plugin = plugin;
            let result: Result<Vec<u8>, (extism::Error, i32)> =
                plugin.call_get_error_code(&function, input.as_slice());
            result
        })
        .await
        .map_err(|e| RuntimeError::Trapped(format!("plugin task failed: {e}")))?;
        guard.disarm();

        let invocation = match outcome {
            Ok(output) => Invocation::success(output),
            Err((err, status)) => self.call_error(err, status)?,
        };

        tracing::debug!(
            status = invocation.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plugin call finished"
        );
        Ok(invocation)
    }

    /// A plugin that returned a status is a completed call; anything that
    /// stopped it early (status 0 or Extism's -1) is an error.
    fn call_error(&self, err: extism::Error, status: i32) -> Result<Invocation, RuntimeError> {
        let message = format!("{err:#}");
        if message.contains("fuel") {
            return Err(RuntimeError::FuelExhausted(self.config.fuel_per_call));
        }
        match status {
            0 | -1 => Err(RuntimeError::Trapped(message)),
            status => Ok(Invocation::failure(status, message)),
        }
    }
}

/// Cancels the running plugin if the call future is dropped before the
/// plugin returns.
struct CancelOnDrop(Option<CancelHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            tracing::debug!("Render abandoned, cancelling plugin call");
            if let Err(e) = handle.cancel() {
                tracing::warn!("Failed to cancel plugin call: {e}");
            }
        }
    }
}

impl Engine for ExtismEngine {
    fn name(&self) -> &str {
        "extism"
    }

    fn invoke<'a>(
        &'a self,
        input: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Invocation, RenderError>> + Send + 'a>> {
        Box::pin(async move { self.call(input).await.map_err(RenderError::from) })
    }
}
