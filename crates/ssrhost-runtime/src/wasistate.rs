use wasmtime::{StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};

/// Per-invocation sandbox state.
///
/// A fresh `WasiState` backs every engine call, so nothing written by one
/// render is visible to the next.
///
/// Deny-default: no preopened directories, no environment variables, no
/// arguments. stdin carries the payload; stdout and stderr are captured in
/// bounded memory pipes owned by the caller.
pub struct WasiState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) limits: StoreLimits,
}

impl WasiState {
    pub fn new(
        input: Vec<u8>,
        stdout: MemoryOutputPipe,
        stderr: MemoryOutputPipe,
        max_memory_bytes: usize,
    ) -> Self {
        let wasi = WasiCtxBuilder::new()
            .stdin(MemoryInputPipe::new(input))
            .stdout(stdout)
            .stderr(stderr)
            .build_p1();

        let limits = StoreLimitsBuilder::new()
            .memory_size(max_memory_bytes)
            .build();

        Self { wasi, limits }
    }
}
