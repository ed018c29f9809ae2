//! Unified error handling for the bracket trading bot
//!
//! Validation rejections, gateway exhaustion and plumbing failures are
//! separate variants so callers can tell them apart without matching on
//! message text.

use crate::clients::BrokerError;
use crate::config::ConfigError;
use crate::types::Side;
use thiserror::Error;

/// Main error type for the bracket trading bot
#[derive(Debug, Error)]
pub enum TradingError {
    // Validation errors
    #[error("Risk limit: quantity {quantity} exceeds max {max}")]
    RiskLimitExceeded { quantity: i64, max: i64 },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("{side} order: stop {stop:.2} is not a positive price on the loss side of entry {entry:.2}")]
    InvalidStopPrice { side: Side, stop: f64, entry: f64 },

    #[error("{side} order: target {target:.2} is not a positive price on the profit side of entry {entry:.2}")]
    InvalidTargetPrice { side: Side, target: f64, entry: f64 },

    #[error("Entry fill price {0:.2} is not positive")]
    InvalidEntryPrice(f64),

    // Gateway errors
    #[error("Broker call '{operation}' failed after {attempts} attempts")]
    GatewayExhausted { operation: &'static str, attempts: u32 },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    // Plumbing
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::RiskLimitExceeded { .. }
            | TradingError::InvalidQuantity(_)
            | TradingError::InvalidStopPrice { .. }
            | TradingError::InvalidTargetPrice { .. }
            | TradingError::InvalidEntryPrice(_) => "validation",

            TradingError::GatewayExhausted { .. } => "gateway",
            TradingError::Broker(_) => "broker",
            TradingError::Config(_) => "config",
            TradingError::Io(_) => "io",
            TradingError::Internal(_) => "internal",
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == "validation"
    }

    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::RiskLimitExceeded { quantity, max } => {
                format!(
                    "Quantity {} is above the configured risk limit of {}\n\n\
                    💡 Reduce the quantity or raise risk.max_quantity in config.toml",
                    quantity, max
                )
            }
            TradingError::InvalidStopPrice { .. } | TradingError::InvalidTargetPrice { .. } => {
                format!(
                    "{}\n\n\
                    💡 Stop and target points must be positive and keep both legs above zero",
                    self
                )
            }
            TradingError::GatewayExhausted { operation, attempts } => {
                format!(
                    "Broker did not respond to '{}' after {} attempts\n\n\
                    💡 Check connectivity and try again",
                    operation, attempts
                )
            }
            _ => self.to_string(),
        }
    }
}

impl From<String> for TradingError {
    fn from(msg: String) -> Self {
        TradingError::Internal(msg)
    }
}

impl From<&str> for TradingError {
    fn from(msg: &str) -> Self {
        TradingError::Internal(msg.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
