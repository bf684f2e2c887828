//! Configuration module for duckrpc.
//!
//! Handles the config file, engine discovery and cursor paging settings.

mod settings;

pub use settings::{
    expand_env_vars, CursorSettings, EngineSettings, Settings, SettingsError, CONFIG_ENV,
    ENGINE_BINARY, ENGINE_ENV,
};
