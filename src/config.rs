use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub run_migrations: bool,
}

/// Tunables for the grant/recovery transactions
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Window in which a second completed order for the same client+package
    /// is treated as a double submit
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,
    /// How many times to look for the winning order after an idempotency-key collision
    #[serde(default = "default_reconcile_attempts")]
    pub reconcile_attempts: u32,
    /// Base backoff; the n-th wait is n × this value
    #[serde(default = "default_reconcile_backoff_ms")]
    pub reconcile_backoff_ms: u64,
    #[serde(default = "default_force_reason_min_len")]
    pub force_reason_min_len: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_duplicate_window_secs() -> u64 {
    60
}

fn default_reconcile_attempts() -> u32 {
    3
}

fn default_reconcile_backoff_ms() -> u64 {
    150
}

fn default_force_reason_min_len() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: default_duplicate_window_secs(),
            reconcile_attempts: default_reconcile_attempts(),
            reconcile_backoff_ms: default_reconcile_backoff_ms(),
            force_reason_min_len: default_force_reason_min_len(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
