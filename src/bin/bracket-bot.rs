// Bracket Trading Bot - interactive CLI
// Single entry point for paper trading OCO brackets

use clap::{Parser, Subcommand};
use tracing::Level;
use bracket_trading_bot::{Config, TradingResult};

// Load command modules from cli directory
#[path = "../cli/run_commands.rs"]
mod run_commands;

use run_commands::SessionEnd;

#[derive(Parser)]
#[command(name = "bracket-bot")]
#[command(version = "0.1.0")]
#[command(about = "OCO bracket order execution", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start an interactive paper-trading session
    Run {
        /// Symbol to track (prompted for if omitted)
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            // Logging may not be initialised yet if the config was bad
            eprintln!("❌ {}", e.user_message());
            1
        }
    };

    // A prompt may still be parked on stdin; don't wait for it
    std::process::exit(code);
}

async fn run(cli: Cli) -> TradingResult<()> {
    match cli.command {
        Commands::Init { force } => {
            init_logging(if cli.verbose { Level::DEBUG } else { Level::INFO });
            run_commands::init_config(&cli.config, force)
        }
        Commands::Run { symbol } => {
            let config = Config::load_or_create(&cli.config)?;
            let level = if cli.verbose { Level::DEBUG } else { config.logging.tracing_level()? };
            init_logging(level);

            match run_commands::run_session(config, symbol).await? {
                SessionEnd::Exit => {}
                SessionEnd::Interrupted => println!("\nMain loop cancelled."),
            }
            Ok(())
        }
    }
}
