// Core trading logic modules

pub mod gateway;
pub mod trade;
pub mod oco_monitor;
pub mod trade_manager;

// Re-export commonly used types
pub use gateway::{BrokerGateway, RetryPolicy};
pub use trade::{Trade, TradeRequest, TradeStatus};
pub use oco_monitor::{MonitorReport, MonitorState, OcoMonitor, TradeEvent};
pub use trade_manager::{validate_order, ActiveTrade, ExecutionOutcome, MonitorId, ShutdownReport, TradeManager};
