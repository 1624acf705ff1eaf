use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use ssrhost_core::{Engine, Invocation, RenderError};
use tokio::sync::OnceCell;
use wasmtime::{ExternType, FuncType, InstancePre, Module, Store, Trap, ValType};
use wasmtime_wasi::I32Exit;
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;

use crate::error::RuntimeError;
use crate::runtime_context::RuntimeContext;
use crate::storage::{self, ModuleCache};
use crate::wasistate::WasiState;

/// Fuel units between cooperative yields to the async runtime.
const FUEL_YIELD_INTERVAL: u64 = 100_000;

fn default_module() -> PathBuf {
    PathBuf::from("enhance-ssr.wasm")
}
/// Entry point run by [`WasmEngine`] when none is configured.
pub const DEFAULT_WASI_ENTRY_POINT: &str = "_start";

fn default_fuel_per_call() -> u64 {
    10_000_000_000
}
fn default_max_memory_bytes() -> usize {
    256 * 1024 * 1024
}
fn default_max_output_bytes() -> usize {
    16 * 1024 * 1024
}

/// How to load and run the engine module.
///
/// Shared by [`WasmEngine`] and [`crate::ExtismEngine`]; `max_output_bytes`
/// and `cache_dir` only apply to the former.
#[derive(Debug, Clone, Deserialize)]
pub struct WasmEngineConfig {
    /// Path to the engine module.
    #[serde(default = "default_module")]
    pub module: PathBuf,
    /// Exported function run once per render. Each engine has its own
    /// default.
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default = "default_fuel_per_call")]
    pub fuel_per_call: u64,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,
    /// Cap on captured stdout and on captured stderr.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Where precompiled modules are kept; `None` compiles on every start.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl WasmEngineConfig {
    pub fn entry_point_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.entry_point.as_deref().unwrap_or(default)
    }
}

impl Default for WasmEngineConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            entry_point: None,
            fuel_per_call: default_fuel_per_call(),
            max_memory_bytes: default_max_memory_bytes(),
            max_output_bytes: default_max_output_bytes(),
            cache_dir: None,
        }
    }
}

/// Rendering engine backed by a sandboxed WASI module.
///
/// Contract with the module: the encoded payload arrives on stdin and the
/// result is read from stdout. The entry point is either `() -> ()` or
/// `() -> i32`. The exit status is the `proc_exit` code if the module calls
/// it, else the returned status (0 for `() -> ()`).
///
/// The module is compiled and linked once, on first use. A failed load is
/// not remembered, so a module fixed on disk is picked up by the next
/// render. Every call then gets its own `Store` and instance.
pub struct WasmEngine {
    runtime: Arc<RuntimeContext>,
    config: WasmEngineConfig,
    entry_point: String,
    cache: Option<ModuleCache>,
    loaded: OnceCell<LoadedModule>,
}

#[derive(Clone)]
struct LoadedModule {
    instance_pre: InstancePre<WasiState>,
    returns_status: bool,
}

/// `Some(true)` for `() -> i32`, `Some(false)` for `() -> ()`, else `None`.
fn entry_returns_status(ty: &FuncType) -> Option<bool> {
    if ty.params().next().is_some() {
        return None;
    }
    let results: Vec<ValType> = ty.results().collect();
    match results.as_slice() {
        [] => Some(false),
        [ValType::I32] => Some(true),
        _ => None,
    }
}

impl WasmEngine {
    pub fn new(config: WasmEngineConfig) -> Result<Self, RuntimeError> {
        let runtime = Arc::new(RuntimeContext::new()?);
        let cache = match &config.cache_dir {
            Some(dir) => {
                let cache = ModuleCache::new(dir.clone());
                cache.init()?;
                Some(cache)
            }
            None => None,
        };
        let entry_point = config.entry_point_or(DEFAULT_WASI_ENTRY_POINT).to_string();
        Ok(Self {
            runtime,
            config,
            entry_point,
            cache,
            loaded: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &WasmEngineConfig {
        &self.config
    }

    /// Compile and link the module now instead of on the first render.
    pub async fn preload(&self) -> Result<(), RuntimeError> {
        self.loaded().await.map(|_| ())
    }

    async fn loaded(&self) -> Result<LoadedModule, RuntimeError> {
        self.loaded.get_or_try_init(|| self.load()).await.cloned()
    }

    async fn load(&self) -> Result<LoadedModule, RuntimeError> {
        let path = self.config.module.clone();
        let engine = self.runtime.engine.clone();
        let cache = self.cache.clone();
        let started = Instant::now();

        tracing::info!(path = %path.display(), "Loading engine module");

        let module = tokio::task::spawn_blocking(move || -> Result<Module, RuntimeError> {
            match &cache {
                Some(cache) => cache.load_or_compile(&path, &engine),
                None => {
                    let bytes = storage::read_module(&path)?;
                    storage::compile(&engine, &bytes, &path)
                }
            }
        })
        .await
        .map_err(|e| RuntimeError::CompilationFailed(format!("compile task failed: {e}")))??;

        let returns_status = match module.get_export(&self.entry_point) {
            Some(ExternType::Func(ty)) => entry_returns_status(&ty)
                .ok_or_else(|| RuntimeError::EntryPointSignature(self.entry_point.clone()))?,
            _ => return Err(RuntimeError::EntryPointMissing(self.entry_point.clone())),
        };

        let instance_pre = self
            .runtime
            .linker
            .instantiate_pre(&module)
            .map_err(|e| RuntimeError::LinkFailed(format!("{}: {e}", self.config.module.display())))?;

        tracing::info!(
            path = %self.config.module.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            returns_status,
            "Engine module ready"
        );
        Ok(LoadedModule {
            instance_pre,
            returns_status,
        })
    }

    /// Run the entry point once in a fresh instance.
    pub async fn call(&self, input: &[u8]) -> Result<Invocation, RuntimeError> {
        let loaded = self.loaded().await?;

        let stdout = MemoryOutputPipe::new(self.config.max_output_bytes);
        let stderr = MemoryOutputPipe::new(self.config.max_output_bytes);
        let state = WasiState::new(
            input.to_vec(),
            stdout.clone(),
            stderr.clone(),
            self.config.max_memory_bytes,
        );

        let mut store = Store::new(&self.runtime.engine, state);
        store.limiter(|state| &mut state.limits);
        store.set_fuel(self.config.fuel_per_call)?;
        store.fuel_async_yield_interval(Some(FUEL_YIELD_INTERVAL))?;

        let instance = loaded
            .instance_pre
            .instantiate_async(&mut store)
            .await
            .map_err(|e| RuntimeError::InstantiationFailed(format!("{e:#}")))?;

        let signature_error =
            |_: wasmtime::Error| RuntimeError::EntryPointSignature(self.entry_point.clone());
        let outcome = if loaded.returns_status {
            let entry = instance
                .get_typed_func::<(), i32>(&mut store, &self.entry_point)
                .map_err(signature_error)?;
            entry.call_async(&mut store, ()).await
        } else {
            let entry = instance
                .get_typed_func::<(), ()>(&mut store, &self.entry_point)
                .map_err(signature_error)?;
            entry.call_async(&mut store, ()).await.map(|()| 0)
        };

        let status = match outcome {
            Ok(status) => status,
            Err(e) => self.exit_status(e)?,
        };

        let fuel_used = store
            .get_fuel()
            .map(|left| self.config.fuel_per_call.saturating_sub(left))
            .unwrap_or_default();
        tracing::debug!(status, fuel_used, "Engine call finished");

        Ok(Invocation {
            status,
            output: stdout.contents().to_vec(),
            stderr: stderr.contents().to_vec(),
        })
    }

    /// Exit via `proc_exit` is a status, not an error; traps are errors.
    fn exit_status(&self, err: wasmtime::Error) -> Result<i32, RuntimeError> {
        if let Some(exit) = err.downcast_ref::<I32Exit>() {
            return Ok(exit.0);
        }
        if let Some(Trap::OutOfFuel) = err.downcast_ref::<Trap>() {
            return Err(RuntimeError::FuelExhausted(self.config.fuel_per_call));
        }
        Err(RuntimeError::Trapped(format!("{err:#}")))
    }
}

impl Engine for WasmEngine {
    fn name(&self) -> &str {
        "wasm"
    }

    fn invoke<'a>(
        &'a self,
        input: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Invocation, RenderError>> + Send + 'a>> {
        Box::pin(async move { self.call(input).await.map_err(RenderError::from) })
    }
}
