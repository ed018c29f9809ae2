// Interactive trading session against the paper-trading broker
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use chrono::Local;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bracket_trading_bot::core::ExecutionOutcome;
use bracket_trading_bot::{
    BrokerGateway, Config, MockBroker, Side, TradeEvent, TradeManager, TradeRequest, TradingError,
    TradingResult,
};

const DEFAULT_SYMBOL: &str = "NIFTY";
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How the command loop ended
pub enum SessionEnd {
    Exit,
    Interrupted,
}

pub fn init_config(path: &str, force: bool) -> TradingResult<()> {
    if Path::new(path).exists() && !force {
        return Err(TradingError::Internal(format!(
            "{} already exists (use --force to overwrite)",
            path
        )));
    }
    Config::default().to_file(path)?;
    info!("📁 Wrote default configuration to {}", path);
    Ok(())
}

pub async fn run_session(config: Config, symbol: Option<String>) -> TradingResult<SessionEnd> {
    let broker = Arc::new(MockBroker::new(config.simulation.clone()));
    let gateway = Arc::new(
        BrokerGateway::new(broker)
            .with_policy(config.gateway.retry_policy())
            .with_retry_logging(config.logging.log_gateway_retries),
    );
    let manager = TradeManager::new(Arc::clone(&gateway), &config);
    let printer = tokio::spawn(print_events(manager.subscribe()));

    println!("--- Bracket Trading CLI (paper trading) ---");
    info!("💰 Max quantity per trade: {}", manager.max_quantity());

    let mut symbol = match symbol {
        Some(s) => s.trim().to_uppercase(),
        None => prompt(&format!("Enter Symbol to Track (e.g. {}): ", DEFAULT_SYMBOL)).await?,
    };
    if symbol.is_empty() {
        symbol = DEFAULT_SYMBOL.to_string();
    }

    let result = command_loop(&manager, &gateway, &mut symbol).await;

    let report = manager.shutdown().await;
    if report.awaited > 0 {
        println!("[System] {} monitors stopped ({} failed).", report.awaited, report.failed);
    }
    printer.abort();
    println!("\n👋 System Shutdown Complete.");
    result
}

async fn command_loop(
    manager: &TradeManager,
    gateway: &Arc<BrokerGateway>,
    symbol: &mut String,
) -> TradingResult<SessionEnd> {
    loop {
        let ticker_stop = CancellationToken::new();
        let ticker = tokio::spawn(stream_last_price(
            Arc::clone(gateway),
            symbol.clone(),
            ticker_stop.clone(),
        ));

        println!(
            "\n[Tracking {}] Press Enter to Trade, 'CHANGE' to switch, 'STATUS' for open trades, 'EXIT' to quit.",
            symbol
        );
        let choice = tokio::select! {
            line = prompt("Command > ") => line?,
            _ = tokio::signal::ctrl_c() => {
                ticker_stop.cancel();
                return Ok(SessionEnd::Interrupted);
            }
        };

        ticker_stop.cancel();
        let _ = ticker.await;

        match choice.as_str() {
            "EXIT" => return Ok(SessionEnd::Exit),
            "CHANGE" => {
                let next = prompt("New Symbol: ").await?;
                if !next.is_empty() {
                    *symbol = next;
                }
                continue;
            }
            "STATUS" => {
                let trades = manager.active_trades();
                if trades.is_empty() {
                    println!("No active brackets.");
                }
                for (id, sym) in trades {
                    println!("  #{} {}", id, sym);
                }
                continue;
            }
            _ => {}
        }

        match read_trade_request(symbol).await? {
            Ok(request) => {
                if let ExecutionOutcome::Aborted { reason, entry_order_id } =
                    manager.execute_trade(&request).await
                {
                    println!("❌ {}", reason.user_message());
                    if let Some(entry_id) = entry_order_id {
                        println!("⚠️  Entry {} is filled and has no bracket.", entry_id);
                    }
                }
            }
            Err(msg) => println!("⚠️ Input Error: {}", msg),
        }
    }
}

/// Outer error is terminal I/O, inner error is bad user input
async fn read_trade_request(symbol: &str) -> TradingResult<Result<TradeRequest, String>> {
    let side = match prompt("Buy/Sell (B/S)?: ").await?.parse::<Side>() {
        Ok(side) => side,
        Err(e) => return Ok(Err(e)),
    };

    let quantity = match prompt("Quantity?: ").await?.parse::<i64>() {
        Ok(q) => q,
        Err(e) => return Ok(Err(format!("quantity: {}", e))),
    };

    let stop_points = match prompt("SL Points?: ").await?.parse::<f64>() {
        Ok(p) => p,
        Err(e) => return Ok(Err(format!("stop points: {}", e))),
    };

    let target_points = match prompt("Target Points?: ").await?.parse::<f64>() {
        Ok(p) => p,
        Err(e) => return Ok(Err(format!("target points: {}", e))),
    };

    Ok(Ok(TradeRequest::new(symbol, side, quantity, stop_points, target_points)))
}

/// Read one trimmed, upper-cased line without blocking the runtime
async fn prompt(text: &str) -> TradingResult<String> {
    let text = text.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "\r{}\r{}", " ".repeat(60), text)?;
        stdout.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .map_err(|e| TradingError::Internal(format!("input task failed: {}", e)))??;

    Ok(line.trim().to_uppercase())
}

async fn stream_last_price(gateway: Arc<BrokerGateway>, symbol: String, stop: CancellationToken) {
    loop {
        let price = tokio::select! {
            _ = stop.cancelled() => break,
            price = gateway.last_price(&symbol) => price,
        };

        match price {
            Ok(ltp) => {
                print!("\r ⚡ [{}] {}: {:.2}      ", Local::now().format("%H:%M:%S"), symbol, ltp);
                let _ = io::stdout().flush();
            }
            Err(e) => warn!(symbol = %symbol, "Price update failed: {}", e),
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = sleep(TICK_INTERVAL) => {}
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<TradeEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("\n{}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Dropped {} trade notifications", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
