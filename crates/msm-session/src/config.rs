//! Configuration for the session registry.

use std::time::Duration;

/// Default idle time before a cached session is flushed and evicted.
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(120);

/// Default time between garbage-collection passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(3600);

/// Default retention for persisted rows (one week).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(168 * 3600);

/// Default session id length in characters.
pub const DEFAULT_SID_LENGTH: usize = 64;

/// Upper bound (exclusive) for the garbage-collection interval, in hours.
pub const MAX_GC_INTERVAL_HOURS: i64 = 720;

/// Configuration for the session registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Name of the session cookie and of the fallback form field.
    pub cookie_name: String,

    /// `Max-Age` sent with the session cookie.
    pub cookie_max_age: Duration,

    /// Idle time after which a cached session is flushed and evicted.
    pub cache_lifetime: Duration,

    /// Time between garbage-collection passes over the backing store.
    pub gc_interval: Duration,

    /// Persisted rows not written for longer than this are deleted.
    pub max_age: Duration,

    /// Length of minted session ids.
    pub sid_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::for_app("msm")
    }
}

impl RegistryConfig {
    /// Defaults for an application; the cookie is named `<app>-sid`.
    pub fn for_app(app_name: &str) -> Self {
        Self {
            cookie_name: format!("{app_name}-sid"),
            cookie_max_age: DEFAULT_MAX_AGE,
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
            gc_interval: DEFAULT_GC_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
            sid_length: DEFAULT_SID_LENGTH,
        }
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = max_age;
        self
    }

    pub fn with_cache_lifetime(mut self, lifetime: Duration) -> Self {
        self.cache_lifetime = lifetime;
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_sid_length(mut self, len: usize) -> Self {
        self.sid_length = len;
        self
    }
}

/// Whether `hours` is an accepted garbage-collection interval.
pub fn valid_gc_interval_hours(hours: i64) -> bool {
    hours > 0 && hours < MAX_GC_INTERVAL_HOURS
}

/// Whether `name` is usable as a cookie name: a non-empty RFC 6265 token,
/// i.e. visible ASCII without separators.
pub fn is_cookie_token(name: &str) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={}";
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.cookie_name, "msm-sid");
        assert_eq!(config.cache_lifetime, Duration::from_secs(120));
        assert_eq!(config.max_age, Duration::from_secs(168 * 3600));
        assert_eq!(config.sid_length, 64);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::for_app("shop")
            .with_cache_lifetime(Duration::from_secs(60))
            .with_gc_interval(Duration::from_secs(7200))
            .with_sid_length(40);
        assert_eq!(config.cookie_name, "shop-sid");
        assert_eq!(config.cache_lifetime, Duration::from_secs(60));
        assert_eq!(config.gc_interval, Duration::from_secs(7200));
        assert_eq!(config.sid_length, 40);
    }

    #[test]
    fn test_gc_interval_bounds() {
        assert!(!valid_gc_interval_hours(0));
        assert!(valid_gc_interval_hours(1));
        assert!(valid_gc_interval_hours(719));
        assert!(!valid_gc_interval_hours(720));
        assert!(!valid_gc_interval_hours(-3));
    }

    #[test]
    fn test_cookie_token() {
        assert!(is_cookie_token("msm-sid"));
        assert!(is_cookie_token("shop_v2.sid"));
        assert!(!is_cookie_token(""));
        assert!(!is_cookie_token("a=b-sid"));
        assert!(!is_cookie_token("a;b-sid"));
        assert!(!is_cookie_token("my app-sid"));
        assert!(!is_cookie_token("caf\u{e9}-sid"));
    }
}
