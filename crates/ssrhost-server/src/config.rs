use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use ssrhost_runtime::WasmEngineConfig;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "ssrhost.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct SsrConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub elements: ElementsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub page: PageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ElementsConfig {
    #[serde(default = "default_elements_dir")]
    pub dir: PathBuf,
}

fn default_elements_dir() -> PathBuf {
    PathBuf::from("elements")
}

impl Default for ElementsConfig {
    fn default() -> Self {
        Self {
            dir: default_elements_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Extism plugin exporting `ssr`, such as `enhance-ssr.wasm`.
    #[default]
    Extism,
    /// WASI command module: payload on stdin, result on stdout.
    Wasm,
    /// Pass-through: the document is the page markup.
    Echo,
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    /// Per-render deadline; 0 disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub wasm: WasmEngineConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            timeout_ms: default_timeout_ms(),
            wasm: WasmEngineConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// What `GET /` renders.
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_markup")]
    pub markup: String,
    #[serde(default = "default_initial_state")]
    pub initial_state: serde_json::Value,
}

fn default_markup() -> String {
    "<my-header>My custom header</my-header>".into()
}
fn default_initial_state() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            markup: default_markup(),
            initial_state: default_initial_state(),
        }
    }
}

impl SsrConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else the first config file found in the
    /// working directory or the user config directory, else defaults.
    ///
    /// Returns the path that was read, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|d| d.join("ssrhost").join(CONFIG_FILE_NAME)),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::from_file(&path)?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }
}
