//! CLI command handlers.

pub mod config;
pub mod gc;
pub mod start;

use std::path::Path;

use anyhow::{Context as _, Result};
use msm_config::{ConfigSource, MsmConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Effective configuration, after all layers are merged.
    pub config: MsmConfig,
    /// Files consulted while loading `config`, in precedence order.
    pub sources: Vec<ConfigSource>,
    /// Non-fatal problems found while loading.
    pub warnings: Vec<String>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load from `explicit` when given, otherwise discover the user and project layers.
    pub fn load(explicit: Option<&Path>, verbose: bool) -> Result<Self> {
        match explicit {
            Some(path) => {
                let config = msm_config::load_config_file(path)
                    .with_context(|| format!("loading {}", path.display()))?;
                Ok(Self {
                    config,
                    sources: vec![ConfigSource {
                        path: path.to_path_buf(),
                        loaded: true,
                    }],
                    warnings: Vec::new(),
                    verbose,
                })
            }
            None => {
                let loaded = msm_config::load_config(None)?;
                Ok(Self {
                    config: loaded.config,
                    sources: loaded.sources,
                    warnings: loaded.warnings,
                    verbose,
                })
            }
        }
    }
}
