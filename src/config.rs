// Process configuration for callflow
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database connection pool size (CALLFLOW_POOL_SIZE)
    pub pool_size: u32,

    /// Database connection pool minimum idle connections (CALLFLOW_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Upper bound for request-supplied node ceilings (CALLFLOW_MAX_NODES_CAP)
    pub max_nodes_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            max_nodes_cap: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; invalid values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        read_var(&lookup, "CALLFLOW_POOL_SIZE", &mut config.pool_size);
        read_var(&lookup, "CALLFLOW_POOL_MIN_IDLE", &mut config.pool_min_idle);
        read_var(&lookup, "CALLFLOW_MAX_NODES_CAP", &mut config.max_nodes_cap);
        if config.pool_size == 0 {
            warn!("CALLFLOW_POOL_SIZE must be positive, using default: 10");
            config.pool_size = 10;
        }
        if config.pool_min_idle > config.pool_size {
            config.pool_min_idle = config.pool_size;
        }
        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    /// Applies the process-wide ceiling to a requested node count.
    pub fn cap_max_nodes(&self, requested: usize) -> usize {
        requested.min(self.max_nodes_cap)
    }
}

fn read_var<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    let Some(val) = lookup(key) else {
        return;
    };
    match val.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("Invalid {} value: {}, using default: {}", key, val, slot),
    }
}
