use std::path::{Path, PathBuf};

use anyhow::Result;
use sha2::{Digest, Sha256};
use wasmtime::{Engine, Module};

use crate::error::RuntimeError;

const PRECOMPILED_EXT: &str = "cwasm";

/// Read a module file into memory.
pub fn read_module(path: &Path) -> Result<Vec<u8>, RuntimeError> {
    std::fs::read(path).map_err(|source| RuntimeError::ModuleUnreadable {
        path: path.display().to_string(),
        source,
    })
}

/// Compile module bytes (binary, or text format for hand-written modules).
pub fn compile(engine: &Engine, bytes: &[u8], path: &Path) -> Result<Module, RuntimeError> {
    Module::new(engine, bytes)
        .map_err(|e| RuntimeError::CompilationFailed(format!("{}: {e}", path.display())))
}

/// SHA-256 hex of module bytes; the cache key.
pub fn hash_module(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Disk-backed cache of precompiled engine modules.
///
/// Layout under `base_dir`:
/// ```text
/// {base_dir}/
///   {sha256 of module bytes}.cwasm   - Wasmtime serialized module
/// ```
///
/// An artifact produced by another Wasmtime version or engine
/// configuration fails to deserialize and is simply recompiled.
#[derive(Debug, Clone)]
pub struct ModuleCache {
    base_dir: PathBuf,
}

impl ModuleCache {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn init(&self) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn cwasm_path(&self, hash: &str) -> PathBuf {
        self.base_dir.join(format!("{hash}.{PRECOMPILED_EXT}"))
    }

    /// Load `wasm_path`, using the precompiled artifact when one is valid.
    pub fn load_or_compile(&self, wasm_path: &Path, engine: &Engine) -> Result<Module, RuntimeError> {
        let bytes = read_module(wasm_path)?;
        let hash = hash_module(&bytes);
        let cwasm_path = self.cwasm_path(&hash);

        if cwasm_path.exists() {
            match self.load_precompiled(&cwasm_path, engine) {
                Ok(module) => {
                    tracing::debug!(hash, "Loaded engine module from precompiled cache");
                    return Ok(module);
                }
                Err(e) => tracing::debug!(hash, "Precompiled cache invalid, recompiling: {e}"),
            }
        }

        let module = compile(engine, &bytes, wasm_path)?;

        match module.serialize() {
            Ok(serialized) => match std::fs::write(&cwasm_path, serialized) {
                Ok(()) => tracing::debug!(hash, "Saved precompiled cache"),
                Err(e) => tracing::warn!(path = %cwasm_path.display(), "Failed to write precompiled cache: {e}"),
            },
            Err(e) => tracing::warn!(hash, "Failed to serialize module: {e}"),
        }

        Ok(module)
    }

    fn load_precompiled(&self, path: &Path, engine: &Engine) -> Result<Module> {
        // SAFETY: artifacts in this directory are only written by
        // `load_or_compile` above, from `Module::serialize`. Wasmtime
        // rejects artifacts built by another version or configuration.
        unsafe { Module::deserialize_file(engine, path) }
    }
}
