//! # Recibo CLI
//!
//! Entry point for the MQTT receipt printer bridge.
//!
//! ## Usage
//!
//! ```bash
//! # Run the bridge (settings via flags or environment)
//! recibo run --mqtt-username acct1 --mqtt-password secret \
//!     --mqtt-broker broker.example.com --printer-name thermal_80mm
//!
//! # Print the built-in test receipt and exit
//! recibo test-print --mqtt-username acct1 --mqtt-password secret
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`):
//!
//! ```bash
//! RUST_LOG=recibo=debug recibo run ...
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use recibo::config::Config;
use recibo::error::{ReciboError, Result};
use recibo::mqtt::ConnectionManager;
use recibo::printer::{JobOutcome, PrinterSession};
use recibo::recovery::RecoveryController;

/// Recibo - MQTT thermal receipt printer bridge
#[derive(Parser, Debug)]
#[command(name = "recibo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge until interrupted or fatally failed
    Run {
        #[command(flatten)]
        config: Config,
    },
    /// Print the built-in test receipt and exit
    TestPrint {
        #[command(flatten)]
        config: Config,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "bridge terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_bridge(config).await,
        Commands::TestPrint { config } => test_print(config),
    }
}

async fn run_bridge(config: Config) -> Result<()> {
    config.validate()?;
    let settings = config.mqtt_settings();

    info!(
        printer_id = %settings.printer_id,
        broker = %settings.broker,
        port = settings.port,
        queue = %config.printer_name,
        heartbeat_secs = settings.heartbeat_interval.as_secs(),
        "starting recibo bridge"
    );

    // Printer first: there is no point holding a broker session without a
    // device to print on.
    let mut session = PrinterSession::new(config.printer_options());
    session.connect()?;
    let printer = Arc::new(Mutex::new(session));

    let connection = Arc::new(ConnectionManager::new(settings, printer.clone()));
    connection.connect().await?;
    info!(topic = %connection.topics().job, "listening for print jobs");

    let (controller, mut fatal_rx) =
        RecoveryController::new(printer.clone(), connection.clone(), config.max_recovery_attempts);
    let recovery_task = tokio::spawn(controller.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = fatal_rx.changed() => {
            error!("recovery gave up, shutting down");
        }
    }

    recovery_task.abort();
    let conn_stats = connection.stats().await;
    connection.disconnect().await;

    let mut session = printer.lock().await;
    session.disconnect();
    let stats = session.stats();
    drop(session);

    info!(
        total_jobs = stats.total_jobs,
        successful = stats.successful_jobs,
        failed = stats.failed_jobs,
        messages_received = conn_stats.messages_received,
        reconnects = conn_stats.reconnect_count,
        "bridge stopped"
    );
    Ok(())
}

fn test_print(config: Config) -> Result<()> {
    let mut session = PrinterSession::new(config.printer_options());
    session.connect()?;

    let outcome = session.test_print();
    session.disconnect();

    match outcome {
        JobOutcome::Completed => {
            println!("Test receipt printed successfully");
            Ok(())
        }
        JobOutcome::Failed => Err(ReciboError::Device("test print failed".to_string())),
    }
}
