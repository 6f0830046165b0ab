//! Configuration system for the msm session server.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[database]`, `[session]` and `[logging]` sections
//! - Config file layering (user config dir + project-local overrides)
//! - Validation of values that would make the server unusable

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
