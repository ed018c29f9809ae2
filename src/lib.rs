// Bracket Trading Bot Library
//
// Places an entry order, brackets it with stop-loss and target legs, and
// watches each bracket as one-cancels-other until a leg fills.

pub mod core;
pub mod clients;
pub mod config;
pub mod error;       // Unified error handling
pub mod simulation;  // Paper-trading broker
pub mod types;

// Re-export core trading types
pub use self::core::{
    BrokerGateway, ExecutionOutcome, MonitorState, RetryPolicy, Trade, TradeEvent, TradeManager,
    TradeRequest, TradeStatus,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export client types
pub use clients::{BrokerClient, BrokerError};

// Re-export configuration
pub use config::{Config, ConfigError, GatewayConfig, LoggingConfig, MonitorConfig, RiskConfig, SimulationConfig};

pub use simulation::MockBroker;
pub use types::{OrderStatus, OrderType, Side};
