//! vid-send - Background daemon for scheduled video publishing
//!
//! Monitors the upload queue and schedule, and drives due uploads through
//! the platform adapters at the right time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use libvidcast::platforms::create_adapters;
use libvidcast::{Config, Database, Orchestrator, Result, Scheduler};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "vid-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled video publishing")]
#[command(long_about = "\
vid-send - Background daemon for scheduled video publishing

DESCRIPTION:
    vid-send is a long-running daemon that monitors the Vidcast upload
    queue and schedule, and publishes due videos to their selected
    platforms.

    Each cycle it picks up scheduled uploads whose time has arrived, then
    works through the manual queue in order. Per-platform progress and
    outcomes are written to the database as uploads run.

USAGE:
    # Run in foreground (logs to stderr)
    vid-send

    # Run with custom poll interval
    vid-send --poll-interval 30

    # Enable verbose logging
    vid-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/vidcast/config.toml
    Database location: ~/.local/share/vidcast/uploads.db

    [scheduling]
    poll_interval = 60  # seconds between polls

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due uploads (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process one cycle and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("vid-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone());

    let adapters = create_adapters(&config).await?;
    let orchestrator = Arc::new(Orchestrator::new(db.clone(), adapters));

    let poll_interval = cli.poll_interval.unwrap_or_else(|| config.poll_interval());
    info!("Poll interval: {}s", poll_interval);

    let scheduler = Scheduler::new(db, orchestrator, Duration::from_secs(poll_interval));

    if cli.once {
        scheduler.run_cycle().await?;
        info!("vid-send: processed one cycle, exiting");
    } else {
        scheduler.run(shutdown).await;
    }

    info!("vid-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            tracing::warn!("Signal setup failed, shutdown signals disabled: {}", e);
            return;
        }
    };

    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) {}
