//! Runtime configuration: bus settings plus harness sizing, overlaid from
//! `BUS_*` environment variables.

use shared_bus::{BusConfig, ConfigError, MatchMode};
use std::time::Duration;
use thiserror::Error;

/// Default number of harness service instances.
pub const DEFAULT_INSTANCES: usize = 3;

/// Errors reading the runtime configuration.
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("BUS_MATCH_MODE must be \"glob\" or \"segment\", got {0:?}")]
    InvalidMatchMode(String),

    #[error(transparent)]
    Bus(#[from] ConfigError),
}

/// Messaging runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Settings for the hosted bus.
    pub bus: BusConfig,
    /// Copies of the harness services registered on the bus.
    pub instances: usize,
    /// How many times the three sequences run.
    pub iterations: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default().with_identity("bus-runtime"),
            instances: DEFAULT_INSTANCES,
            iterations: 1,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, RuntimeConfigError> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Apply `BUS_*` overrides read through `lookup`, then validate.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RuntimeConfigError> {
        if let Some(prefix) = lookup("BUS_PREFIX") {
            self.bus.prefix = prefix;
        }
        if let Some(value) = lookup("BUS_TIMEOUT_MS") {
            let millis = positive("BUS_TIMEOUT_MS", value)?;
            self.bus.default_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("BUS_INSTANCES") {
            self.instances = positive("BUS_INSTANCES", value)? as usize;
        }
        if let Some(value) = lookup("BUS_ITERATIONS") {
            self.iterations = positive("BUS_ITERATIONS", value)?;
        }
        if let Some(value) = lookup("BUS_MATCH_MODE") {
            self.bus.match_mode = match value.as_str() {
                "glob" => MatchMode::Glob,
                "segment" => MatchMode::Segment,
                _ => return Err(RuntimeConfigError::InvalidMatchMode(value)),
            };
        }

        self.bus.validate()?;
        Ok(self)
    }
}

fn positive(var: &'static str, value: String) -> Result<u64, RuntimeConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(RuntimeConfigError::InvalidNumber { var, value }),
    }
}
