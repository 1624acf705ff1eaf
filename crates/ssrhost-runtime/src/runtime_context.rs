use anyhow::Result;
use wasmtime::{Config, Engine, Linker};

use crate::wasistate::WasiState;

/// Shared Wasmtime engine and linker.
///
/// Built once per [`crate::WasmEngine`]. Compiled code lives here; no
/// instance state does. The linker exposes WASI preview1 only: clocks,
/// random and in-memory stdio. Filesystem, environment and arguments stay
/// empty in every [`WasiState`].
pub struct RuntimeContext {
    pub engine: Engine,
    pub linker: Linker<WasiState>,
}

impl RuntimeContext {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.async_support(true);
        config.consume_fuel(true);

        let engine = Engine::new(&config)?;
        let mut linker: Linker<WasiState> = Linker::new(&engine);

        wasmtime_wasi::preview1::add_to_linker_async(&mut linker, |state: &mut WasiState| {
            &mut state.wasi
        })?;

        tracing::debug!("RuntimeContext initialized (async + fuel + WASI preview1)");

        Ok(Self { engine, linker })
    }
}
