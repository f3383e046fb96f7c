//! Simulation clock.
//!
//! The tick counter is the source of truth; elapsed time is derived from it
//! and the fixed time step, never accumulated, so long runs do not drift.

use serde::Serialize;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid time step.
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Discrete simulation clock with a fixed time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimClock {
    tick: u64,
    time_step: f64,
}

impl SimClock {
    /// A clock at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] unless `time_step` is finite and
    /// positive.
    pub fn new(time_step: f64) -> Result<Self, ClockError> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(ClockError::InvalidConfig {
                reason: format!("time_step must be finite and positive, got {time_step}"),
            });
        }
        Ok(Self { tick: 0, time_step })
    }

    /// Advance by one tick and return the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] at `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Duration of one tick.
    pub const fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Simulated time at the current tick.
    pub fn elapsed(&self) -> f64 {
        ticks_to_time(self.tick, self.time_step)
    }
}

/// Simulated time after `ticks` ticks of `time_step`.
#[allow(clippy::cast_precision_loss)] // tick counts stay far below 2^52
pub fn ticks_to_time(ticks: u64, time_step: f64) -> f64 {
    ticks as f64 * time_step
}
