// One-cancels-other monitor for a single bracket trade
//
// Polls both exit legs until one fills (then cancels the other), both are
// cancelled externally, the owner cancels the task, or a broker call fails
// past its retry budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::gateway::BrokerGateway;
use crate::core::trade::{Trade, TradeStatus};
use crate::error::TradingResult;
use crate::types::{OrderStatus, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    TargetHit,
    StopHit,
    BothCancelled,
    Cancelled,
    Errored,
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MonitorState::Running)
    }

    /// Trade status implied by a terminal state, if any
    fn trade_status(&self) -> Option<TradeStatus> {
        match self {
            MonitorState::TargetHit => Some(TradeStatus::TargetFilled),
            MonitorState::StopHit => Some(TradeStatus::StopFilled),
            MonitorState::BothCancelled => Some(TradeStatus::ExternallyCancelled),
            _ => None,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorState::Running => "running",
            MonitorState::TargetHit => "target hit",
            MonitorState::StopHit => "stop hit",
            MonitorState::BothCancelled => "both legs cancelled",
            MonitorState::Cancelled => "cancelled",
            MonitorState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Notifications published on the trade manager's side channel
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Activated {
        symbol: String,
        side: Side,
        quantity: i64,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
    },
    TargetHit { symbol: String, price: f64 },
    StopHit { symbol: String, price: f64 },
    ExternallyCancelled { symbol: String },
    MonitorStopped { symbol: String, state: MonitorState },
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::Activated { symbol, side, quantity, entry_price, stop_price, target_price } => write!(
                f,
                "✅ Trade Active: {} {} {} @ {:.2} | SL: {:.2} | TGT: {:.2}",
                side, quantity, symbol, entry_price, stop_price, target_price
            ),
            TradeEvent::TargetHit { symbol, price } => {
                write!(f, "🎉 TARGET HIT: {} @ {:.2} | Profit Locked.", symbol, price)
            }
            TradeEvent::StopHit { symbol, price } => {
                write!(f, "🛡️ SL HIT: {} @ {:.2} | Loss Limited.", symbol, price)
            }
            TradeEvent::ExternallyCancelled { symbol } => {
                write!(f, "⚠️  {}: both exit orders were cancelled externally", symbol)
            }
            TradeEvent::MonitorStopped { symbol, state } => {
                write!(f, "ℹ️  {}: monitor stopped ({})", symbol, state)
            }
        }
    }
}

/// What a single poll of both legs saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    TargetFilled,
    StopFilled,
    BothCancelled,
    Open,
}

/// Target is checked first, so a poll that sees both legs filled reports
/// `TargetFilled`.
pub fn classify(stop: OrderStatus, target: OrderStatus) -> Observation {
    if target.is_filled() {
        Observation::TargetFilled
    } else if stop.is_filled() {
        Observation::StopFilled
    } else if stop.is_cancelled() && target.is_cancelled() {
        Observation::BothCancelled
    } else {
        Observation::Open
    }
}

/// Final state of a monitor together with the settled trade
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub trade: Trade,
    pub state: MonitorState,
}

pub struct OcoMonitor {
    trade: Trade,
    gateway: Arc<BrokerGateway>,
    poll_interval: Duration,
    events: broadcast::Sender<TradeEvent>,
}

impl OcoMonitor {
    pub fn new(
        trade: Trade,
        gateway: Arc<BrokerGateway>,
        poll_interval: Duration,
        events: broadcast::Sender<TradeEvent>,
    ) -> Self {
        Self {
            trade,
            gateway,
            poll_interval,
            events,
        }
    }

    pub fn trade(&self) -> &Trade {
        &self.trade
    }

    /// Drive the monitor to a terminal state. Never panics on broker errors
    /// and never propagates cancellation.
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorReport {
        info!(
            symbol = %self.trade.symbol,
            stop_id = %self.trade.stop_order_id,
            target_id = %self.trade.target_order_id,
            "Starting OCO monitor"
        );

        let state = self.watch(&cancel).await;

        if let Some(status) = state.trade_status() {
            self.trade.settle(status);
        }

        let event = match state {
            MonitorState::TargetHit => TradeEvent::TargetHit {
                symbol: self.trade.symbol.clone(),
                price: self.trade.target_price,
            },
            MonitorState::StopHit => TradeEvent::StopHit {
                symbol: self.trade.symbol.clone(),
                price: self.trade.stop_price,
            },
            MonitorState::BothCancelled => TradeEvent::ExternallyCancelled {
                symbol: self.trade.symbol.clone(),
            },
            other => TradeEvent::MonitorStopped {
                symbol: self.trade.symbol.clone(),
                state: other,
            },
        };
        // No subscribers is fine
        let _ = self.events.send(event);

        MonitorReport {
            trade: self.trade,
            state,
        }
    }

    async fn watch(&self, cancel: &CancellationToken) -> MonitorState {
        let trade = &self.trade;

        loop {
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                observed = self.poll() => observed,
            };

            match observation {
                Ok(Observation::TargetFilled) => {
                    info!(symbol = %trade.symbol, stop_id = %trade.stop_order_id, "Target hit. Cancelling SL...");
                    self.cancel_leg(&trade.stop_order_id).await;
                    return MonitorState::TargetHit;
                }
                Ok(Observation::StopFilled) => {
                    info!(symbol = %trade.symbol, target_id = %trade.target_order_id, "SL hit. Cancelling target...");
                    self.cancel_leg(&trade.target_order_id).await;
                    return MonitorState::StopHit;
                }
                Ok(Observation::BothCancelled) => {
                    warn!(
                        symbol = %trade.symbol,
                        stop_id = %trade.stop_order_id,
                        target_id = %trade.target_order_id,
                        "Both orders cancelled externally"
                    );
                    return MonitorState::BothCancelled;
                }
                Ok(Observation::Open) => {}
                Err(err) => {
                    error!(
                        symbol = %trade.symbol,
                        stop_id = %trade.stop_order_id,
                        target_id = %trade.target_order_id,
                        "Monitor error: {}",
                        err
                    );
                    return MonitorState::Errored;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    async fn poll(&self) -> TradingResult<Observation> {
        let stop = self.gateway.order_status(&self.trade.stop_order_id).await?;
        let target = self.gateway.order_status(&self.trade.target_order_id).await?;
        Ok(classify(stop, target))
    }

    /// Best effort; the gateway has already retried by the time this logs
    async fn cancel_leg(&self, order_id: &str) {
        if let Err(err) = self.gateway.cancel_order(order_id).await {
            error!(
                symbol = %self.trade.symbol,
                order_id,
                "Failed to cancel opposing leg, it may still be open: {}",
                err
            );
        }
    }

    fn cancelled(&self) -> MonitorState {
        info!(
            symbol = %self.trade.symbol,
            stop_id = %self.trade.stop_order_id,
            target_id = %self.trade.target_order_id,
            "Monitor cancelled"
        );
        MonitorState::Cancelled
    }
}
