//! Simulation configuration.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::parse::{env_bool, env_or, env_parse};
use super::ConfigError;
use crate::pool::{HaltConfig, PoolConfig, PoolResult};

/// Unit applied to every integer duration option.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimeUnit {
    Micros,
    #[default]
    Millis,
    Secs,
}

impl TimeUnit {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "us" | "micros" => Ok(Self::Micros),
            "ms" | "millis" => Ok(Self::Millis),
            "s" | "secs" => Ok(Self::Secs),
            other => Err(ConfigError::Invalid {
                key: "TIME_UNIT".into(),
                message: format!("expected us, ms or s, got '{}'", other),
            }),
        }
    }

    /// Convert a count of this unit into a duration.
    pub fn duration(self, value: u64) -> Duration {
        match self {
            Self::Micros => Duration::from_micros(value),
            Self::Millis => Duration::from_millis(value),
            Self::Secs => Duration::from_secs(value),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Micros => write!(f, "us"),
            Self::Millis => write!(f, "ms"),
            Self::Secs => write!(f, "s"),
        }
    }
}

/// How requests reach the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Through the waiting room into a zero-buffer intake; late requests are dropped.
    #[default]
    DropPattern,
    /// Straight into an intake buffered for every request; nothing is dropped.
    NoDrop,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropPattern => write!(f, "drop_pattern"),
            Self::NoDrop => write!(f, "no_drop"),
        }
    }
}

/// Parameters of one simulation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Number of workers in the pool.
    pub pool_size: usize,
    /// Interval between generated requests.
    pub request_interval: Duration,
    /// Time it takes a worker to process a request.
    pub processing_time: Duration,
    /// Number of requests to generate.
    pub num_requests: usize,
    /// When the pool halts, relative to its start.
    pub halt_after: Duration,
    /// How long the pool stays halted. Zero disables the halt.
    pub halt_duration: Duration,
    /// How long a request may wait in the waiting room before it is dropped.
    pub admission_timeout: Duration,
    pub mode: Mode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            request_interval: Duration::from_millis(100),
            processing_time: Duration::from_millis(1000),
            num_requests: 100,
            halt_after: Duration::from_millis(2000),
            halt_duration: Duration::from_millis(1000),
            admission_timeout: Duration::from_millis(500),
            mode: Mode::DropPattern,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let unit = TimeUnit::parse(&env_or("TIME_UNIT", "ms"))?;

        let pool_size: usize = env_parse("POOL_SIZE", 10)?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "POOL_SIZE".into(),
                message: "pool size cannot be zero".into(),
            });
        }

        let mode = if env_bool("DROP_PATTERN", true) {
            Mode::DropPattern
        } else {
            Mode::NoDrop
        };

        Ok(Self {
            pool_size,
            request_interval: unit.duration(env_parse("REQ_INTERVAL", 100)?),
            processing_time: unit.duration(env_parse("PROC_TIME", 1000)?),
            num_requests: env_parse("NUM_REQ", 100)?,
            halt_after: unit.duration(env_parse("HALT_POOL_TIME", 2000)?),
            halt_duration: unit.duration(env_parse("HALT_POOL_DURATION", 1000)?),
            admission_timeout: unit.duration(env_parse("TIMEOUT", 500)?),
            mode,
        })
    }

    /// Disable the halt.
    pub fn without_halt(mut self) -> Self {
        self.halt_after = Duration::ZERO;
        self.halt_duration = Duration::ZERO;
        self
    }

    /// Set the halt schedule.
    pub fn with_halt(mut self, after: Duration, duration: Duration) -> Self {
        self.halt_after = after;
        self.halt_duration = duration;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Halt schedule for the pool.
    pub fn halt(&self) -> HaltConfig {
        HaltConfig::new(self.halt_after, self.halt_duration)
    }

    /// Pool configuration; fails for a zero pool size.
    pub fn pool_config(&self) -> PoolResult<PoolConfig> {
        Ok(PoolConfig::new(self.pool_size, self.processing_time)?.with_halt(self.halt()))
    }
}
