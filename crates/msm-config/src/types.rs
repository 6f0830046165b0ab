//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use msm_session::{
    DEFAULT_CACHE_LIFETIME, DEFAULT_GC_INTERVAL, RegistryConfig, is_cookie_token,
    valid_gc_interval_hours,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default address to bind to.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default port to listen on.
pub const DEFAULT_PORT: u16 = 8080;

/// Default database connection string.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://msm.db";

/// Shortest session id accepted by [`MsmConfig::validate`].
pub const MIN_SID_LENGTH: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Root Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration, one optional table per section.
///
/// Sections left out of a file fall back to their defaults; when layering,
/// a section present in a later file replaces the earlier one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsmConfig {
    /// HTTP listener configuration.
    pub server: Option<ServerConfig>,

    /// Backing store configuration.
    pub database: Option<DatabaseConfig>,

    /// Session cache configuration.
    pub session: Option<SessionConfig>,

    /// Log file configuration.
    pub logging: Option<LoggingConfig>,
}

impl MsmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy of this config with every section filled in.
    pub fn resolved(&self) -> Self {
        Self {
            server: Some(self.server()),
            database: Some(self.database()),
            session: Some(self.session()),
            logging: Some(self.logging()),
        }
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: MsmConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }

    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn server_mut(&mut self) -> &mut ServerConfig {
        self.server.get_or_insert_with(ServerConfig::default)
    }

    pub fn database_mut(&mut self) -> &mut DatabaseConfig {
        self.database.get_or_insert_with(DatabaseConfig::default)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database().url.trim().is_empty() {
            return Err(ConfigError::invalid("database.url", "must not be empty"));
        }

        let session = self.session();
        if session.app_name.trim().is_empty() {
            return Err(ConfigError::invalid("session.app_name", "must not be empty"));
        }
        if !is_cookie_token(&session.registry_config().cookie_name) {
            return Err(ConfigError::invalid(
                "session.app_name",
                "must not contain whitespace, control characters or any of ()<>@,;:\\\"/[]?={}",
            ));
        }
        if session.max_age_hours == 0 {
            return Err(ConfigError::invalid(
                "session.max_age_hours",
                "must be at least 1",
            ));
        }
        if session.sid_length < MIN_SID_LENGTH {
            return Err(ConfigError::invalid(
                "session.sid_length",
                format!("must be at least {MIN_SID_LENGTH}"),
            ));
        }
        Ok(())
    }

    /// Registry settings derived from the `[session]` section.
    pub fn registry_config(&self) -> RegistryConfig {
        self.session().registry_config()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Trace every HTTP request.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            request_logging: true,
        }
    }
}

impl ServerConfig {
    /// `bind:port` as a socket address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string: `sqlite://PATH`, a bare path, or `:memory:`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Session cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Application name; the cookie is named `<app_name>-sid`.
    pub app_name: String,
    /// Idle seconds before a cached session is flushed. Zero keeps the default.
    pub cache_lifetime_secs: u64,
    /// Hours between garbage-collection passes, accepted when 0 < x < 720.
    pub gc_interval_hours: i64,
    /// Hours a persisted row survives without being written.
    pub max_age_hours: u64,
    /// `Max-Age` of the session cookie, in seconds.
    pub cookie_max_age_secs: u64,
    /// Length of minted session ids.
    pub sid_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: "msm".to_string(),
            cache_lifetime_secs: DEFAULT_CACHE_LIFETIME.as_secs(),
            gc_interval_hours: (DEFAULT_GC_INTERVAL.as_secs() / 3600) as i64,
            max_age_hours: 168,
            cookie_max_age_secs: 604_800,
            sid_length: msm_session::DEFAULT_SID_LENGTH,
        }
    }
}

impl SessionConfig {
    pub fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::for_app(&self.app_name)
            .with_cookie_max_age(Duration::from_secs(self.cookie_max_age_secs))
            .with_max_age(Duration::from_secs(self.max_age_hours.saturating_mul(3600)))
            .with_sid_length(self.sid_length);

        if self.cache_lifetime_secs > 0 {
            config = config.with_cache_lifetime(Duration::from_secs(self.cache_lifetime_secs));
        }
        if valid_gc_interval_hours(self.gc_interval_hours) {
            config = config.with_gc_interval(Duration::from_secs(
                self.gc_interval_hours.unsigned_abs() * 3600,
            ));
        }
        config
    }
}

/// Log file configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling JSON log files. Defaults under the config dir.
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MsmConfig::new();
        assert_eq!(config.server().address(), "127.0.0.1:8080");
        assert_eq!(config.database().url, "sqlite://msm.db");
        assert_eq!(config.session().gc_interval_hours, 1);
        assert!(config.validate().is_ok());

        let registry = config.registry_config();
        assert_eq!(registry.cookie_name, "msm-sid");
        assert_eq!(registry.cache_lifetime, Duration::from_secs(120));
        assert_eq!(registry.gc_interval, Duration::from_secs(3600));
        assert_eq!(registry.cookie_max_age, Duration::from_secs(604_800));
    }

    #[test]
    fn test_parse_full() {
        let config = MsmConfig::from_toml(
            r#"
[server]
bind = "0.0.0.0"
port = 9000
request_logging = false

[database]
url = ":memory:"

[session]
app_name = "shop"
cache_lifetime_secs = 60
gc_interval_hours = 6
max_age_hours = 24
cookie_max_age_secs = 3600
sid_length = 48

[logging]
dir = "/var/log/msm"
"#,
        )
        .unwrap();

        assert_eq!(config.server().address(), "0.0.0.0:9000");
        assert!(!config.server().request_logging);
        assert_eq!(config.database().url, ":memory:");
        assert_eq!(
            config.logging().dir.as_deref(),
            Some(std::path::Path::new("/var/log/msm"))
        );

        let registry = config.registry_config();
        assert_eq!(registry.cookie_name, "shop-sid");
        assert_eq!(registry.cache_lifetime, Duration::from_secs(60));
        assert_eq!(registry.gc_interval, Duration::from_secs(6 * 3600));
        assert_eq!(registry.max_age, Duration::from_secs(24 * 3600));
        assert_eq!(registry.sid_length, 48);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config = MsmConfig::from_toml("[session]\napp_name = \"blog\"\n").unwrap();
        let session = config.session();
        assert_eq!(session.app_name, "blog");
        assert_eq!(session.cache_lifetime_secs, 120);
        assert_eq!(session.sid_length, 64);
    }

    #[test]
    fn test_out_of_range_gc_interval_keeps_default() {
        for hours in [0, -5, 720, 1000] {
            let config =
                MsmConfig::from_toml(&format!("[session]\ngc_interval_hours = {hours}\n")).unwrap();
            assert_eq!(config.registry_config().gc_interval, DEFAULT_GC_INTERVAL);
        }
    }

    #[test]
    fn test_zero_cache_lifetime_keeps_default() {
        let config = MsmConfig::from_toml("[session]\ncache_lifetime_secs = 0\n").unwrap();
        assert_eq!(config.registry_config().cache_lifetime, DEFAULT_CACHE_LIFETIME);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("[database]\nurl = \"\"\n", "database.url"),
            ("[session]\napp_name = \" \"\n", "session.app_name"),
            ("[session]\napp_name = \"a=b\"\n", "session.app_name"),
            ("[session]\napp_name = \"my app\"\n", "session.app_name"),
            ("[session]\nmax_age_hours = 0\n", "session.max_age_hours"),
            ("[session]\nsid_length = 16\n", "session.sid_length"),
        ];
        for (toml, expected) in cases {
            let err = MsmConfig::from_toml(toml).unwrap().validate().unwrap_err();
            match err {
                ConfigError::Invalid { field, .. } => assert_eq!(field, expected),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_merge_replaces_present_sections() {
        let mut base = MsmConfig::from_toml("[server]\nport = 1000\n[database]\nurl = \"a.db\"\n").unwrap();
        let overlay = MsmConfig::from_toml("[server]\nport = 2000\n").unwrap();
        base.merge(overlay);

        assert_eq!(base.server().port, 2000);
        assert_eq!(base.database().url, "a.db");
    }

    #[test]
    fn test_resolved_round_trips_through_toml() {
        let mut config = MsmConfig::new();
        config.server_mut().port = 4242;
        config.database_mut().url = "sqlite:///tmp/x.db".to_string();

        let text = config.resolved().to_toml().unwrap();
        assert!(text.contains("[session]"));
        let parsed = MsmConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.server().port, 4242);
        assert_eq!(parsed.database().url, "sqlite:///tmp/x.db");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            MsmConfig::from_toml("not valid {{{{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
