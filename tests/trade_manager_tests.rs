// Integration tests for bracket execution and OCO monitoring

mod common;

use std::sync::Arc;
use std::time::Duration;

use bracket_trading_bot::core::OcoMonitor;
use bracket_trading_bot::{
    ExecutionOutcome, MonitorState, OrderStatus, OrderType, Side, Trade, TradeEvent, TradeRequest,
    TradingError,
};
use tokio::sync::broadcast;
use common::{create_manager, create_test_config, wait_for_event, wait_until_idle, ScriptedBroker};

#[tokio::test(start_paused = true)]
async fn test_buy_bracket_prices_and_sides() {
    let broker = ScriptedBroker::new(200.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    let outcome = manager
        .execute_trade(&TradeRequest::new("nifty", Side::Buy, 50, 5.0, 10.0))
        .await;

    let active = outcome.active().expect("trade should be active");
    assert_eq!(active.trade.symbol, "NIFTY");
    assert_eq!(active.trade.entry_price, 200.0);
    assert_eq!(active.trade.stop_price, 195.0);
    assert_eq!(active.trade.target_price, 210.0);

    let placed = broker.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!((placed[0].order_type, placed[0].side, placed[0].quantity), (OrderType::Market, Side::Buy, 50));
    assert_eq!((placed[1].order_type, placed[1].side, placed[1].price), (OrderType::Stop, Side::Sell, 195.0));
    assert_eq!((placed[2].order_type, placed[2].side, placed[2].price), (OrderType::Limit, Side::Sell, 210.0));
    assert_eq!(manager.active_monitors(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sell_bracket_prices_and_sides() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    let outcome = manager
        .execute_trade(&TradeRequest::new("BANKNIFTY", Side::Sell, 10, 5.0, 5.0))
        .await;
    assert!(outcome.is_active());

    let placed = broker.placed();
    assert_eq!((placed[1].order_type, placed[1].side, placed[1].price), (OrderType::Stop, Side::Buy, 105.0));
    assert_eq!((placed[2].order_type, placed[2].side, placed[2].price), (OrderType::Limit, Side::Buy, 95.0));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_inverted_bracket_rejected_before_legs() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    // Negative stop points put the BUY stop above entry
    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, -5.0, 5.0))
        .await;

    match outcome {
        ExecutionOutcome::Aborted { reason, entry_order_id } => {
            assert!(matches!(reason, TradingError::InvalidStopPrice { .. }));
            assert_eq!(entry_order_id.as_deref(), Some("ORD-1"));
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(broker.placed().len(), 1, "only the entry may be placed");
    assert_eq!(manager.active_monitors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_nan_points_rejected_before_legs() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    let nan: f64 = "NaN".parse().unwrap();
    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, nan, 5.0))
        .await;
    assert!(matches!(
        outcome,
        ExecutionOutcome::Aborted { reason: TradingError::InvalidStopPrice { .. }, .. }
    ));

    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Sell, 1, 5.0, nan))
        .await;
    assert!(matches!(
        outcome,
        ExecutionOutcome::Aborted { reason: TradingError::InvalidTargetPrice { .. }, .. }
    ));

    let types: Vec<_> = broker.placed().iter().map(|o| o.order_type).collect();
    assert_eq!(types, vec![OrderType::Market, OrderType::Market]);
    assert_eq!(manager.active_monitors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_below_zero_rejected_before_legs() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    // 150 points under a 100.00 entry would put the stop at -50.00
    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 150.0, 5.0))
        .await;

    match outcome {
        ExecutionOutcome::Aborted { reason, entry_order_id } => {
            assert!(matches!(reason, TradingError::InvalidStopPrice { .. }));
            assert_eq!(entry_order_id.as_deref(), Some("ORD-1"));
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(broker.placed().len(), 1);
    assert_eq!(manager.active_monitors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_risk_limit_leaves_entry_unbracketed() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Sell, 5000, 5.0, 5.0))
        .await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Aborted { reason: TradingError::RiskLimitExceeded { quantity: 5000, max: 1000 }, .. }
    ));
    assert_eq!(broker.placed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_positive_fill_price_aborts() {
    let broker = ScriptedBroker::new(0.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Aborted { reason: TradingError::InvalidEntryPrice(_), .. }
    ));
    assert_eq!(broker.placed().len(), 1);
    assert_eq!(manager.active_monitors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_entry_exhaustion_aborts_trade() {
    let broker = ScriptedBroker::new(100.0);
    broker.fail("place_order", u32::MAX);
    let manager = create_manager(broker.clone(), &create_test_config());

    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;

    match outcome {
        ExecutionOutcome::Aborted { reason, entry_order_id } => {
            assert!(matches!(reason, TradingError::GatewayExhausted { attempts: 3, .. }));
            assert!(entry_order_id.is_none());
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(broker.calls("place_order"), 3);
    assert!(broker.placed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_target_fill_cancels_stop() {
    let broker = ScriptedBroker::new(200.0);
    broker.script_status("ORD-3", &[OrderStatus::Pending, OrderStatus::Pending, OrderStatus::Filled]);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 50, 5.0, 10.0))
        .await;

    let event = wait_for_event(&mut events, |e| matches!(e, TradeEvent::TargetHit { .. })).await;
    assert_eq!(event, TradeEvent::TargetHit { symbol: "NIFTY".to_string(), price: 210.0 });

    wait_until_idle(&manager).await;
    assert_eq!(broker.cancels(), vec!["ORD-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_fill_cancels_target() {
    let broker = ScriptedBroker::new(100.0);
    broker.script_status("ORD-2", &[OrderStatus::Pending, OrderStatus::Filled]);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Sell, 10, 5.0, 5.0))
        .await;

    let event = wait_for_event(&mut events, |e| matches!(e, TradeEvent::StopHit { .. })).await;
    assert_eq!(event, TradeEvent::StopHit { symbol: "NIFTY".to_string(), price: 105.0 });

    wait_until_idle(&manager).await;
    assert_eq!(broker.cancels(), vec!["ORD-3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_target_wins_when_both_fill_in_same_poll() {
    let broker = ScriptedBroker::new(100.0);
    broker.script_status("ORD-2", &[OrderStatus::Filled]);
    broker.script_status("ORD-3", &[OrderStatus::Filled]);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;

    wait_for_event(&mut events, |e| matches!(e, TradeEvent::TargetHit { .. })).await;
    wait_until_idle(&manager).await;
    assert_eq!(broker.cancels(), vec!["ORD-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_both_cancelled_externally_issues_no_cancels() {
    let broker = ScriptedBroker::new(100.0);
    broker.script_status("ORD-2", &[OrderStatus::Cancelled]);
    broker.script_status("ORD-3", &[OrderStatus::Pending, OrderStatus::Cancelled]);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;

    wait_for_event(&mut events, |e| matches!(e, TradeEvent::ExternallyCancelled { .. })).await;
    wait_until_idle(&manager).await;
    assert!(broker.cancels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_status_exhaustion_errors_only_that_monitor() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;
    broker.fail("order_status", 3);

    let event = wait_for_event(&mut events, |e| matches!(e, TradeEvent::MonitorStopped { .. })).await;
    assert_eq!(
        event,
        TradeEvent::MonitorStopped { symbol: "NIFTY".to_string(), state: MonitorState::Errored }
    );
    wait_until_idle(&manager).await;
    assert!(broker.cancels().is_empty());

    // The manager keeps working for later trades
    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;
    assert!(outcome.is_active());
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_monitor_mid_sleep() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());
    let mut events = manager.subscribe();

    let outcome = manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;
    let id = outcome.active().expect("active").monitor_id;

    // Let a couple of polls run, then cancel while the monitor sleeps
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(manager.cancel_monitor(id));

    let event = wait_for_event(&mut events, |e| matches!(e, TradeEvent::MonitorStopped { .. })).await;
    assert_eq!(
        event,
        TradeEvent::MonitorStopped { symbol: "NIFTY".to_string(), state: MonitorState::Cancelled }
    );
    wait_until_idle(&manager).await;

    let polls = broker.calls("order_status");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(broker.calls("order_status"), polls, "no broker calls after cancellation");
    assert!(!manager.cancel_monitor(id));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_all_monitors() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker.clone(), &create_test_config());

    for symbol in ["NIFTY", "BANKNIFTY", "FINNIFTY"] {
        let outcome = manager
            .execute_trade(&TradeRequest::new(symbol, Side::Buy, 1, 5.0, 5.0))
            .await;
        assert!(outcome.is_active());
    }
    assert_eq!(manager.active_monitors(), 3);
    assert_eq!(manager.active_trades().len(), 3);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let report = manager.shutdown().await;

    assert_eq!(report.awaited, 3);
    assert_eq!(report.failed, 0);
    assert!(report.outcomes.iter().all(|(_, state)| *state == MonitorState::Cancelled));
    assert_eq!(manager.active_monitors(), 0);

    let again = manager.shutdown().await;
    assert_eq!(again.awaited, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_monitors_is_noop() {
    let broker = ScriptedBroker::new(100.0);
    let manager = create_manager(broker, &create_test_config());

    let report = manager.shutdown().await;
    assert_eq!(report.awaited, 0);
    assert!(report.outcomes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_ceiling_reaps_monitor() {
    let broker = ScriptedBroker::new(100.0);
    let mut config = create_test_config();
    config.monitor.max_lifetime_secs = 5;
    let manager = create_manager(broker.clone(), &config);

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 1, 5.0, 5.0))
        .await;
    assert_eq!(manager.active_monitors(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    wait_until_idle(&manager).await;
    assert!(broker.cancels().is_empty());
    assert_eq!(manager.shutdown().await.awaited, 0);
}

#[tokio::test(start_paused = true)]
async fn test_activation_is_notified() {
    let broker = ScriptedBroker::new(200.0);
    let manager = create_manager(broker, &create_test_config());
    let mut events = manager.subscribe();

    manager
        .execute_trade(&TradeRequest::new("NIFTY", Side::Buy, 50, 5.0, 10.0))
        .await;

    let event = wait_for_event(&mut events, |e| matches!(e, TradeEvent::Activated { .. })).await;
    assert!(event.to_string().contains("BUY 50 NIFTY @ 200.00"));
    manager.shutdown().await;

    let mut extra = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TradeEvent::Activated { .. }) {
            extra += 1;
        }
    }
    assert_eq!(extra, 0, "activation is announced once");
}

#[test]
fn test_register_on_stopped_runtime_does_not_hang() {
    let broker = ScriptedBroker::new(100.0);
    let config = create_test_config();
    let manager = create_manager(broker, &config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let handle = runtime.handle().clone();
    drop(runtime);
    let _context = handle.enter();

    let trade = Trade::new(
        "NIFTY",
        Side::Buy,
        1,
        100.0,
        95.0,
        105.0,
        "ORD-1".to_string(),
        "ORD-2".to_string(),
        "ORD-3".to_string(),
    );
    let (events, _) = broadcast::channel(8);
    let monitor = OcoMonitor::new(
        trade,
        Arc::clone(manager.gateway()),
        config.monitor.poll_interval(),
        events,
    );

    // The runtime drops the task on spawn; registration must still return
    manager.register_monitor(monitor);
    assert_eq!(manager.active_monitors(), 0);
}
