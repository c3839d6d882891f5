//! `settings.json` loader.
//!
//! Settings are looked up in this order:
//!
//! | Source | When |
//! |--------|------|
//! | `--settings <file>` | given on the command line; must exist |
//! | `<config dir>/cmr/settings.json` | present in the platform config directory |
//! | built-in defaults | otherwise |
//!
//! Every field is optional; missing ones take their defaults.  Settings are
//! only read, never written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::serial::{SerialOptions, DEFAULT_BAUD};
use crate::backend::udp::DEFAULT_PORT;
use crate::script::ExportOptions;
use crate::subprocess::PythonRunner;

pub const SETTINGS_FILE: &str = "settings.json";

// ── Public API ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub serial: SerialSettings,
    pub udp: UdpSettings,
    pub python: PythonSettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Default port when `--serial` is given without one.
    pub port: Option<String>,
    pub baud: u32,
    pub keepalive_ms: u64,
    pub warmup_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            keepalive_ms: 50,
            warmup_ms: 1000,
        }
    }
}

impl SerialSettings {
    pub fn options(&self) -> SerialOptions {
        SerialOptions {
            keepalive: Duration::from_millis(self.keepalive_ms.max(1)),
            warmup: Duration::from_millis(self.warmup_ms),
        }
    }
}

impl Settings {
    /// Exporter settings; `port` overrides the configured serial port.
    pub fn export_options(&self, port: Option<&str>) -> ExportOptions {
        let defaults = ExportOptions::default();
        ExportOptions {
            port: port
                .or(self.serial.port.as_deref())
                .map_or(defaults.port, str::to_owned),
            baud: self.serial.baud,
            keepalive_s: self.serial.keepalive_ms.max(1) as f64 / 1000.0,
            warmup_s: self.serial.warmup_ms as f64 / 1000.0,
            scripts_dir: self.python.scripts_dir.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    pub host: Option<String>,
    pub port: u16,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonSettings {
    pub interpreter: String,
    /// Base directory for relative `run_python` file names.
    pub scripts_dir: PathBuf,
}

impl Default for PythonSettings {
    fn default() -> Self {
        let runner = PythonRunner::default();
        Self {
            interpreter: runner.interpreter,
            scripts_dir: runner.scripts_dir,
        }
    }
}

impl PythonSettings {
    pub fn runner(&self) -> PythonRunner {
        PythonRunner::new(self.interpreter.clone(), self.scripts_dir.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How long `stop` waits for the worker before detaching it.
    pub stop_join_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { stop_join_ms: 1000 }
    }
}

impl EngineSettings {
    pub fn stop_join(&self) -> Duration {
        Duration::from_millis(self.stop_join_ms)
    }
}

impl Settings {
    /// Parse settings from a JSON string.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Read settings from a file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Load from `explicit` if given, else from the platform config
    /// directory if a settings file exists there, else use defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "loading settings");
                Self::load_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// `settings.json` inside the platform config directory, if the platform
/// has one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cmr").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
