//! Configuration Module
//!
//! Per-query options, their resolution against cache-wide defaults, and the
//! cache-level configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::host::DEFAULT_NOTIFY_CAPACITY;

// == Defaults ==
/// Default lifetime of a settled entry in milliseconds (5 minutes)
pub const DEFAULT_LIFETIME_MS: u64 = 300_000;

// == Query Config ==
/// Fully resolved options governing one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a settled result is retained; zero keeps it until invalidated
    pub lifetime: Duration,
    /// Whether reading a missing entry starts a fetch
    pub autofetch: bool,
    /// Whether lifetime expiry starts a new fetch instead of leaving the slot empty
    pub refetch_on_expiry: bool,
    /// Recognized but not acted upon by the cache; left to the query function
    pub retry: bool,
    /// Whether a refetch keeps exposing the previous value while pending
    pub stale: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_millis(DEFAULT_LIFETIME_MS),
            autofetch: true,
            refetch_on_expiry: false,
            retry: false,
            stale: false,
        }
    }
}

impl QueryConfig {
    /// Returns true if settled entries should get an eviction timer.
    pub fn expires(&self) -> bool {
        !self.lifetime.is_zero()
    }
}

// == Query Options ==
/// Partially specified options. Unset fields fall back to a base, then to the
/// documented default.
///
/// ```rust
/// # use query_cache::QueryOptions;
/// # use std::time::Duration;
/// let options = QueryOptions::new()
///     .lifetime(Duration::from_secs(30))
///     .autofetch(false);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub lifetime: Option<Duration>,
    pub autofetch: Option<bool>,
    pub refetch_on_expiry: Option<bool>,
    pub retry: Option<bool>,
    pub stale: Option<bool>,
}

impl QueryOptions {
    /// Creates options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn autofetch(mut self, autofetch: bool) -> Self {
        self.autofetch = Some(autofetch);
        self
    }

    pub fn refetch_on_expiry(mut self, refetch_on_expiry: bool) -> Self {
        self.refetch_on_expiry = Some(refetch_on_expiry);
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn stale(mut self, stale: bool) -> Self {
        self.stale = Some(stale);
        self
    }

    // == Merge ==
    /// Returns a copy where every unset field is taken from `fallback`.
    pub fn or(&self, fallback: &QueryOptions) -> QueryOptions {
        QueryOptions {
            lifetime: self.lifetime.or(fallback.lifetime),
            autofetch: self.autofetch.or(fallback.autofetch),
            refetch_on_expiry: self.refetch_on_expiry.or(fallback.refetch_on_expiry),
            retry: self.retry.or(fallback.retry),
            stale: self.stale.or(fallback.stale),
        }
    }

    // == Resolve ==
    /// Fills every unset field with the documented default.
    pub fn resolve(&self) -> QueryConfig {
        let defaults = QueryConfig::default();
        QueryConfig {
            lifetime: self.lifetime.unwrap_or(defaults.lifetime),
            autofetch: self.autofetch.unwrap_or(defaults.autofetch),
            refetch_on_expiry: self.refetch_on_expiry.unwrap_or(defaults.refetch_on_expiry),
            retry: self.retry.unwrap_or(defaults.retry),
            stale: self.stale.unwrap_or(defaults.stale),
        }
    }

    // == From Env ==
    /// Loads options from environment variables. Variables that are unset or
    /// unparsable leave the field unset.
    ///
    /// # Environment Variables
    /// - `QUERY_LIFETIME_MS` - Entry lifetime in milliseconds (default: 300000)
    /// - `QUERY_AUTOFETCH` - Fetch missing entries on read (default: true)
    /// - `QUERY_REFETCH_ON_EXPIRY` - Refetch instead of evicting (default: false)
    /// - `QUERY_RETRY` - Retry flag passed through to queries (default: false)
    /// - `QUERY_STALE` - Keep the previous value while refetching (default: false)
    pub fn from_env() -> Self {
        Self {
            lifetime: env::var("QUERY_LIFETIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            autofetch: env_flag("QUERY_AUTOFETCH"),
            refetch_on_expiry: env_flag("QUERY_REFETCH_ON_EXPIRY"),
            retry: env_flag("QUERY_RETRY"),
            stale: env_flag("QUERY_STALE"),
        }
    }
}

/// Merges a per-call override onto a base: override wins field by field,
/// then base, then the documented default. Neither input is modified.
pub fn resolve(base: &QueryOptions, overrides: &QueryOptions) -> QueryConfig {
    overrides.or(base).resolve()
}

// == Cache Config ==
/// Cache-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Options applied to every query unless overridden per call
    pub defaults: QueryOptions,
    /// Buffer size of the change notification channel
    pub notify_capacity: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Reads the query defaults via [`QueryOptions::from_env`] plus
    /// `QUERY_NOTIFY_CAPACITY` (default: 256).
    pub fn from_env() -> Self {
        Self {
            defaults: QueryOptions::from_env(),
            notify_capacity: env::var("QUERY_NOTIFY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(DEFAULT_NOTIFY_CAPACITY),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: QueryOptions::default(),
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_config_default() {
        let config = QueryConfig::default();
        assert_eq!(config.lifetime, Duration::from_millis(300_000));
        assert!(config.autofetch);
        assert!(!config.refetch_on_expiry);
        assert!(!config.retry);
        assert!(!config.stale);
        assert!(config.expires());
    }

    #[test]
    fn test_empty_options_resolve_to_defaults() {
        assert_eq!(QueryOptions::new().resolve(), QueryConfig::default());
    }

    #[test]
    fn test_override_wins_over_base() {
        let base = QueryOptions::new()
            .lifetime(Duration::from_millis(100))
            .autofetch(false);
        let overrides = QueryOptions::new().autofetch(true);

        let config = resolve(&base, &overrides);
        assert_eq!(config.lifetime, Duration::from_millis(100));
        assert!(config.autofetch);
        assert!(!config.refetch_on_expiry);
    }

    #[test]
    fn test_resolve_leaves_inputs_untouched() {
        let base = QueryOptions::new().stale(true);
        let overrides = QueryOptions::new().retry(true);
        let (base_before, overrides_before) = (base, overrides);

        let config = resolve(&base, &overrides);
        assert!(config.stale);
        assert!(config.retry);
        assert_eq!(base, base_before);
        assert_eq!(overrides, overrides_before);
    }

    #[test]
    fn test_zero_lifetime_never_expires() {
        let config = QueryOptions::new().lifetime(Duration::ZERO).resolve();
        assert!(!config.expires());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.defaults, QueryOptions::default());
        assert_eq!(config.notify_capacity, DEFAULT_NOTIFY_CAPACITY);
    }

    #[test]
    fn test_config_from_env() {
        // All env manipulation lives in this one test to avoid races
        env::remove_var("QUERY_LIFETIME_MS");
        env::remove_var("QUERY_AUTOFETCH");
        env::remove_var("QUERY_REFETCH_ON_EXPIRY");
        env::remove_var("QUERY_RETRY");
        env::remove_var("QUERY_STALE");
        env::remove_var("QUERY_NOTIFY_CAPACITY");

        let config = Config::from_env();
        assert_eq!(config.defaults, QueryOptions::default());
        assert_eq!(config.notify_capacity, DEFAULT_NOTIFY_CAPACITY);

        env::set_var("QUERY_LIFETIME_MS", "1500");
        env::set_var("QUERY_AUTOFETCH", "off");
        env::set_var("QUERY_STALE", "TRUE");
        env::set_var("QUERY_RETRY", "maybe");
        env::set_var("QUERY_NOTIFY_CAPACITY", "0");

        let config = Config::from_env();
        assert_eq!(config.defaults.lifetime, Some(Duration::from_millis(1500)));
        assert_eq!(config.defaults.autofetch, Some(false));
        assert_eq!(config.defaults.stale, Some(true));
        assert_eq!(config.defaults.retry, None);
        assert_eq!(config.notify_capacity, DEFAULT_NOTIFY_CAPACITY);

        env::remove_var("QUERY_LIFETIME_MS");
        env::remove_var("QUERY_AUTOFETCH");
        env::remove_var("QUERY_STALE");
        env::remove_var("QUERY_RETRY");
        env::remove_var("QUERY_NOTIFY_CAPACITY");
    }
}
