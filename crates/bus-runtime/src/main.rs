//! # Relay Bus Runtime
//!
//! Entry point for the messaging runtime. See the library docs for the
//! startup sequence and the `BUS_*` variables in `Cargo.toml`.

use anyhow::{Context, Result};
use bus_runtime::{BusRuntime, RuntimeConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = RuntimeConfig::from_env().context("loading configuration")?;
    info!(
        prefix = %config.bus.prefix,
        instances = config.instances,
        iterations = config.iterations,
        "Starting relay bus runtime"
    );

    let runtime = BusRuntime::new(config)?;
    let handles = runtime.start()?;

    let result = runtime.run().await;
    for handle in handles {
        handle.abort();
    }

    let iterations = result?;
    let stats = runtime.bus().dispatch_stats();
    info!(
        iterations,
        sync = stats.sync_dispatches.load(std::sync::atomic::Ordering::Relaxed),
        multicast = stats.multicast_dispatches.load(std::sync::atomic::Ordering::Relaxed),
        "Messaging sequences passed"
    );
    Ok(())
}
