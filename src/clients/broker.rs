// Broker client contract consumed by the gateway
//
// Implementations are synchronous and may block. One call is one attempt;
// retrying is the gateway's job, never the client's.

use crate::types::{OrderStatus, OrderType, Side};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("transient broker failure: {0}")]
    Transient(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("operation not supported by this broker: {0}")]
    Unsupported(&'static str),
}

/// Capability set of a brokerage connection.
///
/// Clients are shared between concurrently running monitors, so they must be
/// `Send + Sync` and serialize access to their own state.
pub trait BrokerClient: Send + Sync {
    /// Whether `last_price` is backed by a real quote source
    fn supports_last_price(&self) -> bool {
        false
    }

    fn last_price(&self, _symbol: &str) -> Result<f64, BrokerError> {
        Err(BrokerError::Unsupported("last_price"))
    }

    /// Submit an order and return the broker-assigned id.
    /// `price` is ignored for market orders.
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        order_type: OrderType,
        price: f64,
    ) -> Result<String, BrokerError>;

    fn order_status(&self, order_id: &str) -> Result<OrderStatus, BrokerError>;

    fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    fn average_fill_price(&self, order_id: &str) -> Result<f64, BrokerError>;
}
