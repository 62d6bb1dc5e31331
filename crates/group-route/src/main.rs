//! GroupRouteEx
//!
//! Routes three existing orders to one broker under a VWAP strategy and
//! prints the per-order outcome, then waits for ENTER to shut down.
//! The process exits 0 whatever happens; failures are reported on the console.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use emsx_core::logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
use emsx_core::{
    wait_for_enter, Console, EmsxConfig, RunOutcome, SessionController, SimulatedTransport, VERSION,
};

const APP_NAME: &str = "group-route-ex";

#[derive(Parser, Debug)]
#[command(name = "group-route-ex", version, about = "Route a group of EMSX orders to one broker")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Write diagnostics as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(args: &Args) {
    let level = parse_log_level(&args.log_level).unwrap_or(tracing::Level::WARN);
    let mut config = LoggingConfig::new(level);
    if args.log_json {
        config = config.with_json();
    }
    if let Err(e) = setup_logging(config) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

async fn run(console: &Console) -> Result<RunOutcome> {
    let transport = Arc::new(SimulatedTransport::new());
    let mut controller = SessionController::new(EmsxConfig::default(), transport, console.clone())
        .context("invalid session configuration")?;

    let outcome = controller.run(tokio::io::stdin()).await?;
    Ok(outcome)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);
    log_welcome(APP_NAME, VERSION);

    let console = Console::stdout();
    console.line("Bloomberg - EMSX API Example - GroupRouteEx");

    match run(&console).await {
        Ok(outcome) => info!(?outcome, "run finished"),
        Err(e) => {
            error!("run failed: {:#}", e);
            console.line(format_args!("Library Exception!!!{:#}", e));
        }
    }

    console.line("Press ENTER to quit");
    if let Err(e) = wait_for_enter(tokio::io::stdin()).await {
        error!("failed to read stdin: {}", e);
    }
}
