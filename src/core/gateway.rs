// Retrying gateway over a blocking broker client
//
// Every broker call is moved onto tokio's blocking pool so a slow client
// never stalls the monitors sharing the runtime, and transient failures are
// retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::clients::{BrokerClient, BrokerError};
use crate::error::{TradingError, TradingResult};
use crate::types::{OrderStatus, OrderType, Side};

/// Retry mechanism with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the failed attempt with index `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,                                    // 3 attempts
            Duration::from_millis(500),          // 500ms base delay
            Duration::from_secs(30),             // 30s max delay
            2.0,                                 // Double delay each time
        )
    }
}

/// Async facade over a [`BrokerClient`] with uniform retry semantics.
///
/// The gateway holds no per-call state, so one instance can be shared by
/// every monitor through an `Arc`.
pub struct BrokerGateway {
    client: Arc<dyn BrokerClient>,
    policy: RetryPolicy,
    log_retries: bool,
}

impl BrokerGateway {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            log_retries: true,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_logging(mut self, enable: bool) -> Self {
        self.log_retries = enable;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` against the client on a blocking worker, retrying failures.
    ///
    /// A panic inside the client counts as a failed attempt. Each failure,
    /// including the final one, waits out its backoff delay; once the attempt
    /// budget is spent [`TradingError::GatewayExhausted`] is returned.
    pub async fn invoke<T, F>(&self, operation: &'static str, call: F) -> TradingResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn BrokerClient) -> Result<T, BrokerError> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let attempts = self.policy.max_attempts();

        for attempt in 0..attempts {
            let client = Arc::clone(&self.client);
            let call = Arc::clone(&call);
            let outcome = tokio::task::spawn_blocking(move || call(client.as_ref())).await;

            let failure = match outcome {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "Broker call recovered");
                    }
                    return Ok(value);
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) => format!("broker worker failed: {}", join_err),
            };

            // Every failure backs off, the last one included
            let delay = self.policy.delay_for_attempt(attempt);
            if self.log_retries {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Broker call failed ({}), backing off {:?}",
                    failure,
                    delay
                );
            }
            sleep(delay).await;
        }

        error!(operation, attempts, "Broker call failed after max retries");
        Err(TradingError::GatewayExhausted { operation, attempts })
    }

    /// Latest traded price, or `0.0` when the client has no quote source
    pub async fn last_price(&self, symbol: &str) -> TradingResult<f64> {
        if !self.client.supports_last_price() {
            return Ok(0.0);
        }
        let symbol = symbol.to_string();
        self.invoke("last_price", move |client| client.last_price(&symbol))
            .await
    }

    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
    ) -> TradingResult<String> {
        let symbol = symbol.to_string();
        self.invoke("place_market_order", move |client| {
            client.place_order(&symbol, side, quantity, OrderType::Market, 0.0)
        })
        .await
    }

    pub async fn place_stop_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: f64,
    ) -> TradingResult<String> {
        let symbol = symbol.to_string();
        self.invoke("place_stop_order", move |client| {
            client.place_order(&symbol, side, quantity, OrderType::Stop, price)
        })
        .await
    }

    pub async fn place_target_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: f64,
    ) -> TradingResult<String> {
        let symbol = symbol.to_string();
        self.invoke("place_target_order", move |client| {
            client.place_order(&symbol, side, quantity, OrderType::Limit, price)
        })
        .await
    }

    pub async fn order_status(&self, order_id: &str) -> TradingResult<OrderStatus> {
        let order_id = order_id.to_string();
        self.invoke("order_status", move |client| client.order_status(&order_id))
            .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> TradingResult<()> {
        let order_id = order_id.to_string();
        self.invoke("cancel_order", move |client| client.cancel_order(&order_id))
            .await
    }

    pub async fn average_fill_price(&self, order_id: &str) -> TradingResult<f64> {
        let order_id = order_id.to_string();
        self.invoke("average_fill_price", move |client| {
            client.average_fill_price(&order_id)
        })
        .await
    }
}
