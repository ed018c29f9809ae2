// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bracket_trading_bot::{
    BrokerClient, BrokerError, BrokerGateway, Config, OrderStatus, OrderType, Side, TradeEvent,
    TradeManager,
};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: OrderType,
    pub price: f64,
}

#[derive(Default)]
struct Script {
    next_id: u32,
    fill_price: f64,
    placed: Vec<PlacedOrder>,
    cancels: Vec<String>,
    statuses: HashMap<String, VecDeque<OrderStatus>>,
    failures: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, u32>,
}

/// Broker double with scripted order statuses and injectable failures.
///
/// Ids are handed out in placement order (`ORD-1` entry, `ORD-2` stop,
/// `ORD-3` target for a single bracket). A status script repeats its last
/// entry once exhausted; unscripted orders report `Pending`.
pub struct ScriptedBroker {
    script: Mutex<Script>,
}

impl ScriptedBroker {
    pub fn new(fill_price: f64) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                fill_price,
                ..Script::default()
            }),
        })
    }

    pub fn script_status(&self, order_id: &str, statuses: &[OrderStatus]) {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(order_id.to_string(), statuses.iter().copied().collect());
    }

    /// Fail the next `count` calls of `operation`
    pub fn fail(&self, operation: &'static str, count: u32) {
        self.script.lock().unwrap().failures.insert(operation, count);
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.script.lock().unwrap().placed.clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.script.lock().unwrap().cancels.clone()
    }

    pub fn calls(&self, operation: &'static str) -> u32 {
        self.script.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    fn attempt(&self, operation: &'static str) -> Result<(), BrokerError> {
        let mut script = self.script.lock().unwrap();
        *script.calls.entry(operation).or_insert(0) += 1;
        if let Some(remaining) = script.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrokerError::Transient(format!("{} unavailable", operation)));
            }
        }
        Ok(())
    }
}

impl BrokerClient for ScriptedBroker {
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        order_type: OrderType,
        price: f64,
    ) -> Result<String, BrokerError> {
        self.attempt("place_order")?;
        let mut script = self.script.lock().unwrap();
        script.next_id += 1;
        let id = format!("ORD-{}", script.next_id);
        script.placed.push(PlacedOrder {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type,
            price,
        });
        Ok(id)
    }

    fn order_status(&self, order_id: &str) -> Result<OrderStatus, BrokerError> {
        self.attempt("order_status")?;
        let mut script = self.script.lock().unwrap();
        let status = match script.statuses.get_mut(order_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(OrderStatus::Pending),
            Some(queue) => queue.front().copied().unwrap_or(OrderStatus::Pending),
            None => OrderStatus::Pending,
        };
        Ok(status)
    }

    fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.attempt("cancel_order")?;
        self.script.lock().unwrap().cancels.push(order_id.to_string());
        Ok(())
    }

    fn average_fill_price(&self, _order_id: &str) -> Result<f64, BrokerError> {
        self.attempt("average_fill_price")?;
        Ok(self.script.lock().unwrap().fill_price)
    }
}

/// Default configuration with retry warnings silenced
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.risk.max_quantity = 1000;
    config.logging.log_gateway_retries = false;
    config
}

pub fn create_manager(broker: Arc<ScriptedBroker>, config: &Config) -> TradeManager {
    let gateway = BrokerGateway::new(broker)
        .with_policy(config.gateway.retry_policy())
        .with_retry_logging(config.logging.log_gateway_retries);
    TradeManager::new(Arc::new(gateway), config)
}

/// Wait (in virtual time) for the first event matching `pred`
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<TradeEvent>, pred: F) -> TradeEvent
where
    F: Fn(&TradeEvent) -> bool,
{
    let deadline = Duration::from_secs(600);
    tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for trade event")
}

/// Wait until every monitor has left the registry
pub async fn wait_until_idle(manager: &TradeManager) {
    for _ in 0..1000 {
        if manager.active_monitors() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("monitors still active: {}", manager.active_monitors());
}
