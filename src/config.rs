// Configuration management for the bracket trading bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::gateway::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_quantity: i64, // Hard ceiling on a single trade's quantity
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self { max_quantity: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,     // 0.5s, 1.0s, 2.0s ...
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub max_lifetime_secs: u64, // Safety net, monitors are force-cancelled after this
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_lifetime_secs: 24 * 60 * 60,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_gateway_retries: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_gateway_retries: true,
        }
    }
}

impl LoggingConfig {
    pub fn tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        self.level
            .parse::<tracing::Level>()
            .map_err(|_| ConfigError::Validation(format!("unknown log level '{}'", self.level)))
    }
}

/// Knobs for the paper-trading broker used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub starting_price: f64,
    pub price_step: f64,
    pub place_latency_ms: u64,
    pub status_latency_ms: u64,
    pub cancel_latency_ms: u64,
    pub fill_price_latency_ms: u64,
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_price: 100.0,
            price_step: 0.5,
            place_latency_ms: 500,
            status_latency_ms: 200,
            cancel_latency_ms: 200,
            fill_price_latency_ms: 100,
            failure_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    /// No latency and no injected failures
    pub fn instant() -> Self {
        Self {
            place_latency_ms: 0,
            status_latency_ms: 0,
            cancel_latency_ms: 0,
            fill_price_latency_ms: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk.max_quantity <= 0 {
            return Err(ConfigError::Validation("max_quantity must be greater than 0".to_string()));
        }

        if self.gateway.max_attempts == 0 {
            return Err(ConfigError::Validation("max_attempts must be greater than 0".to_string()));
        }

        if self.gateway.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation("backoff_multiplier must be at least 1.0".to_string()));
        }

        if self.gateway.max_delay_ms < self.gateway.base_delay_ms {
            return Err(ConfigError::Validation("max_delay_ms must not be below base_delay_ms".to_string()));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Validation("poll_interval_ms must be greater than 0".to_string()));
        }

        if self.monitor.max_lifetime_secs == 0 {
            return Err(ConfigError::Validation("max_lifetime_secs must be greater than 0".to_string()));
        }

        if !(0.0..1.0).contains(&self.simulation.failure_rate) {
            return Err(ConfigError::Validation("failure_rate must be in [0, 1)".to_string()));
        }

        if self.simulation.starting_price <= 0.0 {
            return Err(ConfigError::Validation("starting_price must be positive".to_string()));
        }

        self.logging.tracing_level()?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
