// Bracket trade lifecycle and monitor supervision

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use futures_util::future::join_all;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MonitorConfig, RiskConfig};
use crate::core::gateway::BrokerGateway;
use crate::core::oco_monitor::{MonitorReport, MonitorState, OcoMonitor, TradeEvent};
use crate::core::trade::{bracket_prices, Trade, TradeRequest};
use crate::error::{TradingError, TradingResult};
use crate::types::Side;

pub type MonitorId = u64;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Check a bracket against the risk ceiling and the side's price ordering.
///
/// Quantity is checked before prices, the ceiling before positivity. Stop
/// and target must also be finite and positive.
pub fn validate_order(
    side: Side,
    quantity: i64,
    entry: f64,
    stop: f64,
    target: f64,
    max_quantity: i64,
) -> TradingResult<()> {
    if quantity > max_quantity {
        return Err(TradingError::RiskLimitExceeded { quantity, max: max_quantity });
    }

    if quantity <= 0 {
        return Err(TradingError::InvalidQuantity(quantity));
    }

    // Written as the accepted condition so NaN falls through to rejection
    let (stop_ok, target_ok) = match side {
        Side::Buy => (stop < entry, entry < target),
        Side::Sell => (entry < stop, target < entry),
    };

    if !(stop_ok && is_positive_price(stop)) {
        return Err(TradingError::InvalidStopPrice { side, stop, entry });
    }
    if !(target_ok && is_positive_price(target)) {
        return Err(TradingError::InvalidTargetPrice { side, target, entry });
    }

    Ok(())
}

fn is_positive_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Result of [`TradeManager::execute_trade`]
#[derive(Debug)]
pub enum ExecutionOutcome {
    Active(ActiveTrade),
    /// Nothing is being monitored. If `entry_order_id` is set the entry
    /// filled and that position is open without a bracket.
    Aborted {
        reason: TradingError,
        entry_order_id: Option<String>,
    },
}

impl ExecutionOutcome {
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionOutcome::Active(_))
    }

    pub fn active(&self) -> Option<&ActiveTrade> {
        match self {
            ExecutionOutcome::Active(active) => Some(active),
            ExecutionOutcome::Aborted { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveTrade {
    pub monitor_id: MonitorId,
    pub trade: Trade,
}

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub awaited: usize,
    pub failed: usize,
    pub outcomes: Vec<(MonitorId, MonitorState)>,
}

struct Abort {
    reason: TradingError,
    entry_order_id: Option<String>,
}

impl Abort {
    fn before_entry(reason: TradingError) -> Self {
        Self { reason, entry_order_id: None }
    }

    fn after_entry(reason: TradingError, entry_order_id: &str) -> Self {
        Self { reason, entry_order_id: Some(entry_order_id.to_string()) }
    }
}

struct ActiveMonitor {
    symbol: String,
    cancel: CancellationToken,
    handle: JoinHandle<MonitorReport>,
}

type Registry = Arc<Mutex<HashMap<MonitorId, ActiveMonitor>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<MonitorId, ActiveMonitor>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a monitor from the registry when its task ends, however it ends
struct RegistryGuard {
    id: MonitorId,
    registry: Registry,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.id);
    }
}

pub struct TradeManager {
    gateway: Arc<BrokerGateway>,
    risk: RiskConfig,
    monitor: MonitorConfig,
    monitors: Registry,
    next_id: AtomicU64,
    events: broadcast::Sender<TradeEvent>,
}

impl TradeManager {
    pub fn new(gateway: Arc<BrokerGateway>, config: &Config) -> Self {
        Self::with_limits(gateway, config.risk.clone(), config.monitor.clone())
    }

    pub fn with_limits(gateway: Arc<BrokerGateway>, risk: RiskConfig, monitor: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            gateway,
            risk,
            monitor,
            monitors: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn gateway(&self) -> &Arc<BrokerGateway> {
        &self.gateway
    }

    pub fn max_quantity(&self) -> i64 {
        self.risk.max_quantity
    }

    /// Receive trade notifications (activation, target/stop hits, ...)
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    pub fn validate_order(&self, side: Side, quantity: i64, entry: f64, stop: f64, target: f64) -> TradingResult<()> {
        validate_order(side, quantity, entry, stop, target, self.risk.max_quantity)
    }

    /// Open a bracket: market entry, stop and target legs, then a monitor.
    ///
    /// Failures are logged and returned as [`ExecutionOutcome::Aborted`];
    /// this never returns an error.
    pub async fn execute_trade(&self, request: &TradeRequest) -> ExecutionOutcome {
        match self.open_bracket(request).await {
            Ok(active) => ExecutionOutcome::Active(active),
            Err(Abort { reason, entry_order_id }) => {
                match &entry_order_id {
                    Some(entry_id) if reason.is_validation() => error!(
                        symbol = %request.symbol,
                        entry_id = %entry_id,
                        "Risk validation failed: {}. Entry position left open without a bracket",
                        reason
                    ),
                    Some(entry_id) => error!(
                        symbol = %request.symbol,
                        entry_id = %entry_id,
                        "Trade aborted after entry: {}",
                        reason
                    ),
                    None => error!(symbol = %request.symbol, "Trade aborted before entry: {}", reason),
                }
                ExecutionOutcome::Aborted { reason, entry_order_id }
            }
        }
    }

    async fn open_bracket(&self, request: &TradeRequest) -> Result<ActiveTrade, Abort> {
        let symbol = request.symbol.trim().to_uppercase();
        let side = request.side;
        let quantity = request.quantity;
        info!("Initiating Trade: {} {} {}", side, quantity, symbol);

        let entry_order_id = self
            .gateway
            .place_market_order(&symbol, side, quantity)
            .await
            .map_err(Abort::before_entry)?;

        let entry_price = self
            .gateway
            .average_fill_price(&entry_order_id)
            .await
            .map_err(|e| Abort::after_entry(e, &entry_order_id))?;

        if !is_positive_price(entry_price) {
            return Err(Abort::after_entry(
                TradingError::InvalidEntryPrice(entry_price),
                &entry_order_id,
            ));
        }

        let (stop_price, target_price) =
            bracket_prices(side, entry_price, request.stop_points, request.target_points);

        self.validate_order(side, quantity, entry_price, stop_price, target_price)
            .map_err(|e| Abort::after_entry(e, &entry_order_id))?;

        let exit_side = side.opposite();
        info!("Placing OCO -> SL: {:.2} | TGT: {:.2}", stop_price, target_price);

        let stop_order_id = self
            .gateway
            .place_stop_order(&symbol, exit_side, quantity, stop_price)
            .await
            .map_err(|e| Abort::after_entry(e, &entry_order_id))?;

        let target_order_id = match self
            .gateway
            .place_target_order(&symbol, exit_side, quantity, target_price)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(symbol = %symbol, stop_id = %stop_order_id, "Stop leg is live without a target");
                return Err(Abort::after_entry(e, &entry_order_id));
            }
        };

        let trade = Trade::new(
            &symbol,
            side,
            quantity,
            entry_price,
            stop_price,
            target_price,
            entry_order_id,
            stop_order_id,
            target_order_id,
        );

        let monitor = OcoMonitor::new(
            trade.clone(),
            Arc::clone(&self.gateway),
            self.monitor.poll_interval(),
            self.events.clone(),
        );
        let monitor_id = self.register_monitor(monitor);

        let _ = self.events.send(TradeEvent::Activated {
            symbol: trade.symbol.clone(),
            side,
            quantity,
            entry_price,
            stop_price,
            target_price,
        });
        info!(
            monitor_id,
            symbol = %trade.symbol,
            side = %side,
            quantity,
            entry_price,
            "Bracket active"
        );

        Ok(ActiveTrade { monitor_id, trade })
    }

    /// Spawn a monitor under the lifetime ceiling and track it until it ends.
    ///
    /// The task holds off until its entry is in the registry, so its own
    /// removal can never run before its insertion. The registry lock is
    /// never held across `tokio::spawn`.
    pub fn register_monitor(&self, monitor: OcoMonitor) -> MonitorId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let ceiling = self.monitor.max_lifetime();
        let fallback = monitor.trade().clone();
        let symbol = fallback.symbol.clone();
        let guard = RegistryGuard {
            id,
            registry: Arc::clone(&self.monitors),
        };
        let (inserted_tx, inserted_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _ = inserted_rx.await;
            match timeout(ceiling, monitor.run(token)).await {
                Ok(report) => report,
                Err(_) => {
                    warn!(
                        symbol = %fallback.symbol,
                        stop_id = %fallback.stop_order_id,
                        target_id = %fallback.target_order_id,
                        "Monitor exceeded its {:?} lifetime, force-cancelled",
                        ceiling
                    );
                    MonitorReport {
                        trade: fallback,
                        state: MonitorState::Cancelled,
                    }
                }
            }
        });

        lock(&self.monitors).insert(id, ActiveMonitor { symbol, cancel, handle });

        // Receiver gone means the runtime dropped the task without running it
        if inserted_tx.send(()).is_err() {
            warn!(monitor_id = id, "Monitor task was dropped before it started");
            lock(&self.monitors).remove(&id);
        }
        id
    }

    /// Request cancellation of one monitor. Returns false if it is not active.
    pub fn cancel_monitor(&self, id: MonitorId) -> bool {
        match lock(&self.monitors).get(&id) {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_monitors(&self) -> usize {
        lock(&self.monitors).len()
    }

    /// Snapshot of `(id, symbol)` for every running monitor, ordered by id
    pub fn active_trades(&self) -> Vec<(MonitorId, String)> {
        let mut trades: Vec<_> = lock(&self.monitors)
            .iter()
            .map(|(id, active)| (*id, active.symbol.clone()))
            .collect();
        trades.sort_by_key(|(id, _)| *id);
        trades
    }

    /// Cancel every monitor and wait for all of them to finish.
    ///
    /// A monitor that fails while stopping is logged and counted, it never
    /// keeps the others from being awaited. Calling this again is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        let drained: Vec<(MonitorId, ActiveMonitor)> = lock(&self.monitors).drain().collect();
        if drained.is_empty() {
            return ShutdownReport::default();
        }

        info!("[System] Shutting down {} background monitors...", drained.len());
        for (_, active) in &drained {
            active.cancel.cancel();
        }

        let results = join_all(drained.into_iter().map(|(id, active)| async move {
            (id, active.symbol, active.handle.await)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (id, symbol, result) in results {
            report.awaited += 1;
            match result {
                Ok(monitor) => {
                    debug!(monitor_id = id, symbol = %symbol, state = %monitor.state, "Monitor stopped");
                    report.outcomes.push((id, monitor.state));
                }
                Err(err) => {
                    warn!(monitor_id = id, symbol = %symbol, "Monitor failed during shutdown: {}", err);
                    report.failed += 1;
                }
            }
        }

        info!("[System] monitors cleaned up.");
        report
    }
}
