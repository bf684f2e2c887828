//! TOML-based configuration for duckrpc.
//!
//! Supports a config file (duckrpc.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [engine]
//! path = "${HOME}/bin/duckrpc-engine"
//! args = []
//!
//! [cursor]
//! chunk_size = 100
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Executable name searched for when no engine path is configured.
pub const ENGINE_BINARY: &str = "duckrpc-engine";

/// Environment variable naming the engine executable.
pub const ENGINE_ENV: &str = "DUCKRPC_ENGINE";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DUCKRPC_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Engine binary not found. Set engine.path in config or DUCKRPC_ENGINE")]
    EngineNotFound,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Engine process configuration.
    pub engine: EngineSettings,

    /// Cursor paging configuration.
    pub cursor: CursorSettings,
}

/// Engine process configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Path to the engine binary (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Extra command-line arguments for the engine.
    pub args: Vec<String>,
}

impl EngineSettings {
    /// Settings for an engine at a known path.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            args: Vec::new(),
        }
    }

    /// Resolve the engine binary path.
    ///
    /// Searches in order:
    /// 1. `path` from the config, with environment variables expanded
    /// 2. Environment variable `DUCKRPC_ENGINE`
    /// 3. `duckrpc-engine` or `bin/duckrpc-engine` under the working directory
    /// 4. `duckrpc-engine` on `PATH`
    pub fn resolve_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }

        if let Ok(path) = env::var(ENGINE_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        if let Some(path) = env::current_dir().ok().and_then(|dir| find_engine_in(&dir)) {
            return Ok(path);
        }

        if let Ok(output) = std::process::Command::new("which")
            .arg(ENGINE_BINARY)
            .output()
        {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }

        Err(SettingsError::EngineNotFound)
    }
}

/// Look for the engine binary directly under `dir` or in its `bin/`.
///
/// The result is joined onto `dir`, so it keeps a directory component and
/// is never looked up on `PATH` when spawned.
fn find_engine_in(dir: &Path) -> Option<PathBuf> {
    [dir.join(ENGINE_BINARY), dir.join("bin").join(ENGINE_BINARY)]
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Cursor paging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CursorSettings {
    /// Rows requested per fetch while iterating a cursor.
    pub chunk_size: usize,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self { chunk_size: 100 }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DUCKRPC_CONFIG`
    /// 2. `./duckrpc.toml`
    /// 3. `~/.config/duckrpc/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("duckrpc.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("duckrpc").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cursor.chunk_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "cursor.chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Lone $
                result.push('$');
                continue;
            }
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
