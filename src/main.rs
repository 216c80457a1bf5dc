mod bluetooth;
mod config;
mod models;
mod recorder;
mod storage;
mod utils;

use log::{error, info, warn};
use std::future::Future;
use time::UtcOffset;
use tokio::sync::oneshot;

use bluetooth::run_session;
use config::LoggerConfig;
use utils::local_offset;

async fn async_main(
    config: LoggerConfig,
    utc_offset: UtcOffset,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting accelerometer logger, writing to {}", config.csv_path.display());

    // Handle Ctrl+C gracefully, a second one forces exit
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        forward_interrupts(tokio::signal::ctrl_c, tx).await;
        warn!("Second interrupt, exiting without cleanup");
        std::process::exit(130);
    });

    if let Err(e) = run_session(&config, utc_offset, rx).await {
        error!("Fatal error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Turn the first interrupt into a stop request, return on the second
///
/// If the signal listener fails, this never returns and keeps `stop` alive
/// so the session is not stopped.
async fn forward_interrupts<F, Fut>(mut next_interrupt: F, stop: oneshot::Sender<()>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Stopping, press Ctrl+C again to force exit");
    let _ = stop.send(());

    if let Err(e) = next_interrupt().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match LoggerConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Read before the runtime starts worker threads
    let utc_offset = local_offset();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config, utc_offset))
}
