// Paper-trading broker
//
// Random-walk prices per symbol. Market orders fill at once, stop and limit
// legs fill when a later price update crosses their trigger.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use rand::Rng;
use uuid::Uuid;

use crate::clients::{BrokerClient, BrokerError};
use crate::config::SimulationConfig;
use crate::types::{OrderStatus, OrderType, Side};

#[derive(Debug, Clone)]
pub struct SimulatedOrder {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: OrderType,
    pub trigger_price: f64,
    pub status: OrderStatus,
    pub avg_price: f64,
}

impl SimulatedOrder {
    /// Whether a pending exit leg is crossed by `price`
    fn is_triggered_by(&self, price: f64) -> bool {
        match (self.side, self.order_type) {
            (Side::Buy, OrderType::Limit) => price <= self.trigger_price,
            (Side::Buy, OrderType::Stop) => price >= self.trigger_price,
            (Side::Sell, OrderType::Limit) => price >= self.trigger_price,
            (Side::Sell, OrderType::Stop) => price <= self.trigger_price,
            (_, OrderType::Market) => false,
        }
    }
}

#[derive(Debug, Default)]
struct BookState {
    orders: HashMap<String, SimulatedOrder>,
    prices: HashMap<String, f64>,
}

pub struct MockBroker {
    config: SimulationConfig,
    state: Mutex<BookState>,
}

impl MockBroker {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BookState::default()),
        }
    }

    /// Force a price, filling any legs it crosses
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.lock();
        state.prices.insert(symbol.to_string(), price);
        Self::fill_crossed(&mut state, symbol, price);
    }

    pub fn order(&self, order_id: &str) -> Option<SimulatedOrder> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn pending_orders(&self, symbol: &str) -> Vec<SimulatedOrder> {
        self.lock()
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Pending)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency(ms: u64) {
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    fn maybe_fail(&self, operation: &str) -> Result<(), BrokerError> {
        if self.config.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.config.failure_rate) {
            return Err(BrokerError::Transient(format!("simulated {} timeout", operation)));
        }
        Ok(())
    }

    fn fill_crossed(state: &mut BookState, symbol: &str, price: f64) {
        for order in state.orders.values_mut() {
            if order.symbol == symbol && order.status == OrderStatus::Pending && order.is_triggered_by(price) {
                order.status = OrderStatus::Filled;
                order.avg_price = order.trigger_price;
            }
        }
    }

    fn current_price(&self, state: &BookState, symbol: &str) -> f64 {
        state.prices.get(symbol).copied().unwrap_or(self.config.starting_price)
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl BrokerClient for MockBroker {
    fn supports_last_price(&self) -> bool {
        true
    }

    fn last_price(&self, symbol: &str) -> Result<f64, BrokerError> {
        self.maybe_fail("last_price")?;
        let mut state = self.lock();
        let base = self.current_price(&state, symbol);
        let step = self.config.price_step;
        let movement = if step > 0.0 { rand::thread_rng().gen_range(-step..=step) } else { 0.0 };
        let price = ((base + movement).max(0.05) * 100.0).round() / 100.0;

        state.prices.insert(symbol.to_string(), price);
        Self::fill_crossed(&mut state, symbol, price);
        Ok(price)
    }

    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        order_type: OrderType,
        price: f64,
    ) -> Result<String, BrokerError> {
        self.maybe_fail("place_order")?;
        if quantity <= 0 {
            return Err(BrokerError::Rejected(format!("quantity {} must be positive", quantity)));
        }

        let id = format!("ORD-{}", &Uuid::new_v4().simple().to_string()[..8]);
        {
            let mut state = self.lock();
            let (status, avg_price) = match order_type {
                OrderType::Market => (OrderStatus::Filled, self.current_price(&state, symbol)),
                _ => (OrderStatus::Pending, 0.0),
            };
            state.orders.insert(
                id.clone(),
                SimulatedOrder {
                    id: id.clone(),
                    symbol: symbol.to_string(),
                    side,
                    quantity,
                    order_type,
                    trigger_price: price,
                    status,
                    avg_price,
                },
            );
        }

        Self::latency(self.config.place_latency_ms);
        Ok(id)
    }

    fn order_status(&self, order_id: &str) -> Result<OrderStatus, BrokerError> {
        Self::latency(self.config.status_latency_ms);
        self.maybe_fail("order_status")?;
        Ok(self
            .lock()
            .orders
            .get(order_id)
            .map(|o| o.status)
            .unwrap_or(OrderStatus::Unknown))
    }

    fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        Self::latency(self.config.cancel_latency_ms);
        self.maybe_fail("cancel_order")?;
        if let Some(order) = self.lock().orders.get_mut(order_id) {
            order.status = OrderStatus::Cancelled;
        }
        Ok(())
    }

    fn average_fill_price(&self, order_id: &str) -> Result<f64, BrokerError> {
        Self::latency(self.config.fill_price_latency_ms);
        self.maybe_fail("average_fill_price")?;
        Ok(self
            .lock()
            .orders
            .get(order_id)
            .map(|o| o.avg_price)
            .unwrap_or(0.0))
    }
}
