//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/msm/config.toml` (user config)
//! 2. `./msm.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, MsmConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "msm.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "msm";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "MSM_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: MsmConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Problems with individual layers that did not stop loading.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `MSM_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = MsmConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<MsmConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    MsmConfig::from_toml(&contents)
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory for msm.
///
/// Checks `MSM_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(config: &mut MsmConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let loaded = path.is_file()
        && match load_config_file(path) {
            Ok(layer) => {
                config.merge(layer);
                true
            }
            Err(e) => {
                warnings.push(format!("Failed to load {}: {}", path.display(), e));
                false
            }
        };

    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[server]\nport = 9191\n").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server().port, 9191);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/msm.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.config, MsmConfig::new());
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.sources.len(), 2);
    }

    #[test]
    fn test_project_overrides_user() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[server]\nport = 8000\n\n[database]\nurl = \"user.db\"\n",
        )
        .unwrap();
        fs::write(project.path().join("msm.toml"), "[server]\nport = 3000\n").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();

        assert_eq!(loaded.config.server().port, 3000);
        assert_eq!(loaded.config.database().url, "user.db");
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("msm.toml"), "not valid toml {{{{").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
        assert!(loaded.loaded_from().is_empty());
    }
}
