//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Statement engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Statement engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of compiled statements kept in the plan cache.
    #[serde(default = "default_plan_cache_capacity")]
    pub plan_cache_capacity: u64,
    /// Seconds an unused compiled statement stays cached.
    #[serde(default = "default_plan_cache_idle_secs")]
    pub plan_cache_idle_secs: u64,
    /// Upper bound for each structure/aggregate fetch, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Decimal places used when presenting values and percentages.
    #[serde(default = "default_presentation_scale")]
    pub presentation_scale: u32,
}

fn default_plan_cache_capacity() -> u64 {
    64
}

fn default_plan_cache_idle_secs() -> u64 {
    3600 // 1 hour
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_presentation_scale() -> u32 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_cache_capacity: default_plan_cache_capacity(),
            plan_cache_idle_secs: default_plan_cache_idle_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            presentation_scale: default_presentation_scale(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "demonstra=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("DEMONSTRA").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
