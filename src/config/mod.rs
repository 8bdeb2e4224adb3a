//! Configuration module for drop_gate.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use drop_gate::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Workers: {}", config.simulation.pool_size);
//! ```

mod error;
mod logging;
mod parse;
mod simulation;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use simulation::{Mode, SimulationConfig, TimeUnit};

use parse::env_bool;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Simulation parameters.
    pub simulation: SimulationConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Print Prometheus metrics after the run.
    pub print_metrics: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            simulation: SimulationConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            print_metrics: env_bool("PRINT_METRICS", false),
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        let sim = &self.simulation;
        info!("Configuration loaded:");
        info!("  Mode: {}", sim.mode);
        info!("  Pool size: {}", sim.pool_size);
        info!("  Request interval: {:?}", sim.request_interval);
        info!("  Processing time: {:?}", sim.processing_time);
        info!("  Requests: {}", sim.num_requests);

        if sim.halt().is_enabled() {
            info!(
                "  Halt: after {:?} for {:?}",
                sim.halt_after, sim.halt_duration
            );
        } else {
            info!("  Halt: disabled");
        }

        match sim.mode {
            Mode::DropPattern => info!("  Admission timeout: {:?}", sim.admission_timeout),
            Mode::NoDrop => info!("  Admission timeout: not applied"),
        }

        if self.print_metrics {
            info!("  Metrics: printed after run");
        }
    }
}
