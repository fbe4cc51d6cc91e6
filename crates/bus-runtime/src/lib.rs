//! # Relay Bus Messaging Runtime
//!
//! Hosts several instances of the harness services on one bus and drives
//! the messaging sequences against them.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, then `BUS_*` environment)
//! 2. Create the bus
//! 3. Register instance 0; spawn registration of the others
//! 4. Start the result sweep
//! 5. Run sequence1, sequence2 and sequence3 once per iteration
//!
//! Instances after the first register concurrently with the first
//! sequences, so sequence2 may see a partial multicast and wait.

pub mod config;
pub mod sequences;
pub mod services;

use anyhow::{bail, Context, Result};
use shared_bus::{BusError, MessageBus, Payload, SendOptions, DEFAULT_CLEANUP_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use config::RuntimeConfig;

use crate::sequences::{Sequence1, Sequence2, Sequence3, END};
use crate::services::{AppendSuffix, Digit, PatternEcho, StepBack, StepForward, DIGITS, RESOLUTION_PATTERNS};

/// Budget for one whole sequence, including every request it makes.
pub const SEQUENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Sequence services, in the order they run.
pub const SEQUENCES: [&str; 3] = ["sequence1", "sequence2", "sequence3"];

/// Register one instance of every harness service on `bus`.
///
/// Registration order inside an instance matches the resolution table so
/// the earliest-registered tie-break is exercised.
pub fn register_instance(bus: &MessageBus, instances: usize) -> Result<(), BusError> {
    let prefix = bus.prefix().to_string();

    for pattern in RESOLUTION_PATTERNS {
        bus.subscribe(pattern, Arc::new(PatternEcho::new(&prefix, pattern)))?;
    }
    bus.subscribe("sequence1", Arc::new(Sequence1::new(bus.clone())))?;

    for digit in DIGITS {
        bus.subscribe("e", Arc::new(Digit(digit)))?;
    }
    bus.subscribe("sequence2", Arc::new(Sequence2::new(bus.clone(), instances)))?;

    bus.subscribe("f1", Arc::new(StepForward::new(&prefix)))?;
    bus.subscribe("f2", Arc::new(StepBack::new(bus.clone())))?;
    bus.subscribe("g1", Arc::new(AppendSuffix))?;
    bus.subscribe("sequence3", Arc::new(Sequence3::new(bus.clone())))?;

    Ok(())
}

/// The messaging runtime.
pub struct BusRuntime {
    bus: MessageBus,
    config: RuntimeConfig,
}

impl BusRuntime {
    /// Create the runtime and its bus.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let bus = MessageBus::new(config.bus.clone()).context("invalid bus configuration")?;
        Ok(Self { bus, config })
    }

    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Register all service instances and start the sweep.
    ///
    /// # Returns
    ///
    /// Handles for the registration tasks of instances after the first and
    /// for the sweep.
    pub fn start(&self) -> Result<Vec<JoinHandle<()>>> {
        let instances = self.config.instances;
        register_instance(&self.bus, instances).context("registering instance 0")?;

        let mut handles = Vec::with_capacity(instances);
        for index in 1..instances {
            let bus = self.bus.clone();
            handles.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                match register_instance(&bus, instances) {
                    Ok(()) => debug!(index, "Instance registered"),
                    Err(err) => error!(index, error = %err, "Instance registration failed"),
                }
            }));
        }

        handles.push(self.bus.start_cleanup(DEFAULT_CLEANUP_INTERVAL));
        info!(
            instances,
            patterns = self.bus.router().registry().len(),
            "Harness services registered"
        );
        Ok(handles)
    }

    /// Run every sequence for the configured number of iterations.
    ///
    /// # Returns
    ///
    /// The number of iterations completed.
    pub async fn run(&self) -> Result<u64> {
        for iteration in 0..self.config.iterations {
            for sequence in SEQUENCES {
                let reply = self
                    .bus
                    .send_sync_with(
                        &self.bus.prefixed(sequence),
                        Payload::from(iteration.to_string()),
                        SendOptions::new().with_timeout(SEQUENCE_TIMEOUT),
                    )
                    .await
                    .with_context(|| format!("{sequence} failed in iteration {iteration}"))?;

                if reply.as_ref() != END.as_bytes() {
                    bail!(
                        "{sequence} replied {:?} in iteration {iteration}",
                        String::from_utf8_lossy(&reply)
                    );
                }
            }
            info!(iteration, "Messaging iteration complete");
        }
        Ok(self.config.iterations)
    }
}
