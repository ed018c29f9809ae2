// Bracket trade record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Active,
    TargetFilled,
    StopFilled,
    ExternallyCancelled, // Both legs closed by someone else
}

/// Caller input for opening a bracket
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub stop_points: f64,
    pub target_points: f64,
}

impl TradeRequest {
    pub fn new(symbol: impl Into<String>, side: Side, quantity: i64, stop_points: f64, target_points: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            stop_points,
            target_points,
        }
    }
}

/// One filled entry and its two exit legs.
///
/// Everything except `status` is fixed at construction; `status` moves out
/// of `Active` at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub entry_order_id: String,
    pub stop_order_id: String,
    pub target_order_id: String,
    pub opened_at: DateTime<Utc>,
    status: TradeStatus,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: &str,
        side: Side,
        quantity: i64,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        entry_order_id: String,
        stop_order_id: String,
        target_order_id: String,
    ) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            side,
            quantity,
            entry_price,
            stop_price,
            target_price,
            entry_order_id,
            stop_order_id,
            target_order_id,
            opened_at: Utc::now(),
            status: TradeStatus::Active,
        }
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    /// Side used by the stop and target legs
    pub fn exit_side(&self) -> Side {
        self.side.opposite()
    }

    /// Record the terminal outcome. Returns false if already settled.
    pub fn settle(&mut self, status: TradeStatus) -> bool {
        if self.status != TradeStatus::Active || status == TradeStatus::Active {
            return false;
        }
        self.status = status;
        true
    }
}

/// Stop and target prices for an entry, as `(stop, target)`.
/// BUY: stop below and target above; SELL mirrored.
pub fn bracket_prices(side: Side, entry_price: f64, stop_points: f64, target_points: f64) -> (f64, f64) {
    match side {
        Side::Buy => (entry_price - stop_points, entry_price + target_points),
        Side::Sell => (entry_price + stop_points, entry_price - target_points),
    }
}
