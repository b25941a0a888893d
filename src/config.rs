//! Configuration Module
//!
//! Construction options shared by every backend, loadable from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CacheError;

/// Default cap on live entries for the in-memory backend.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Default interval between background expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// == Backend Kind ==
/// Which `RawCache` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
    NatsKv,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "nats" | "natskv" | "nats-kv" => Ok(Self::NatsKv),
            other => Err(CacheError::Config(format!("unknown cache backend '{}'", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::NatsKv => "nats",
        };
        f.write_str(name)
    }
}

// == Cache Options ==
/// Backend construction options.
///
/// Each backend reads only the fields it understands: the in-memory backend
/// ignores the DSN and credentials, the remote backends ignore the entry cap.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Backend to construct
    pub backend: BackendKind,
    /// Connection string for remote backends
    pub dsn: Option<String>,
    /// Default TTL applied when `set` is called without one
    pub max_age: Option<Duration>,
    /// Logical namespace (Redis key prefix, NATS bucket name)
    pub name: Option<String>,
    /// Credentials file for backends that need one
    pub creds_file: Option<PathBuf>,
    /// Maximum live entries for the in-memory backend
    pub max_entries: usize,
    /// Background sweep interval for the in-memory backend
    pub sweep_interval: Duration,
    /// Deadline for a single remote operation
    pub timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// Zero clears the default TTL.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = (!max_age.is_zero()).then_some(max_age);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_creds_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.creds_file = Some(path.into());
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory`, `redis` or `nats` (default: memory)
    /// - `CACHE_DSN` - Remote connection string (default: unset)
    /// - `CACHE_NAME` - Namespace or bucket name (default: unset)
    /// - `CACHE_MAX_AGE_SECS` - Default TTL in seconds, 0 for none (default: unset)
    /// - `CACHE_CREDS_FILE` - Credentials file path (default: unset)
    /// - `CACHE_MAX_ENTRIES` - In-memory entry cap (default: 100000)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - In-memory sweep interval (default: 300)
    /// - `CACHE_TIMEOUT_MS` - Remote operation deadline (default: unset)
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: parse_var("CACHE_BACKEND").unwrap_or(defaults.backend),
            dsn: string_var("CACHE_DSN"),
            max_age: parse_var::<u64>("CACHE_MAX_AGE_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            name: string_var("CACHE_NAME"),
            creds_file: string_var("CACHE_CREDS_FILE").map(PathBuf::from),
            max_entries: parse_var("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            sweep_interval: parse_var::<u64>("CACHE_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            timeout: parse_var::<u64>("CACHE_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            dsn: None,
            max_age: None,
            name: None,
            creds_file: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            timeout: None,
        }
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    string_var(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "CACHE_BACKEND",
        "CACHE_DSN",
        "CACHE_NAME",
        "CACHE_MAX_AGE_SECS",
        "CACHE_CREDS_FILE",
        "CACHE_MAX_ENTRIES",
        "CACHE_SWEEP_INTERVAL_SECS",
        "CACHE_TIMEOUT_MS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_options_default() {
        let options = CacheOptions::default();
        assert_eq!(options.backend, BackendKind::Memory);
        assert_eq!(options.max_entries, 100_000);
        assert_eq!(options.sweep_interval, Duration::from_secs(300));
        assert!(options.max_age.is_none());
        assert!(options.dsn.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let options = CacheOptions::new(BackendKind::Redis)
            .with_dsn("redis://127.0.0.1:6379")
            .with_max_age(Duration::from_secs(60))
            .with_name("sessions")
            .with_creds_file("/etc/creds")
            .with_timeout(Duration::from_millis(500));

        assert_eq!(options.backend, BackendKind::Redis);
        assert_eq!(options.dsn.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(options.max_age, Some(Duration::from_secs(60)));
        assert_eq!(options.name.as_deref(), Some("sessions"));
        assert_eq!(options.creds_file, Some(PathBuf::from("/etc/creds")));
        assert_eq!(options.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_zero_max_age_clears_default() {
        let options = CacheOptions::default()
            .with_max_age(Duration::from_secs(10))
            .with_max_age(Duration::ZERO);
        assert!(options.max_age.is_none());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("Redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert_eq!("nats-kv".parse::<BackendKind>().unwrap(), BackendKind::NatsKv);
        assert!(matches!(
            "memcached".parse::<BackendKind>(),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_options_from_env_defaults() {
        clear_env();

        let options = CacheOptions::from_env();
        assert_eq!(options.backend, BackendKind::Memory);
        assert_eq!(options.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(options.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert!(options.timeout.is_none());
    }

    #[test]
    #[serial]
    fn test_options_from_env_values() {
        clear_env();
        env::set_var("CACHE_BACKEND", "redis");
        env::set_var("CACHE_DSN", "redis://cache:6379/2");
        env::set_var("CACHE_NAME", "ratelimit");
        env::set_var("CACHE_MAX_AGE_SECS", "90");
        env::set_var("CACHE_MAX_ENTRIES", "not-a-number");
        env::set_var("CACHE_TIMEOUT_MS", "750");

        let options = CacheOptions::from_env();
        assert_eq!(options.backend, BackendKind::Redis);
        assert_eq!(options.dsn.as_deref(), Some("redis://cache:6379/2"));
        assert_eq!(options.name.as_deref(), Some("ratelimit"));
        assert_eq!(options.max_age, Some(Duration::from_secs(90)));
        assert_eq!(options.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(options.timeout, Some(Duration::from_millis(750)));

        clear_env();
    }
}
