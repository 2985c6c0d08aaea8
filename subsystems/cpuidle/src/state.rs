//! # Candidate Idle State
//!
//! The governor-facing description of LP2. The governor reads
//! `exit_latency_us` and `target_residency_us` to rank states; the engine
//! keeps both in step with the learned latency of the slot in use.

use crate::platform::Micros;

/// LP2 as seen by the idle governor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleState {
    /// State name
    pub name: &'static str,
    /// Exit latency the governor should assume
    pub exit_latency_us: i32,
    /// Minimum predicted idle time worth entering the state for
    pub target_residency_us: Micros,
}

impl IdleState {
    /// Create a state from a seed latency and the fixed power-off cost
    pub const fn new(name: &'static str, exit_latency_us: i32, power_off_time_us: Micros) -> Self {
        Self {
            name,
            exit_latency_us,
            target_residency_us: exit_latency_us as Micros + power_off_time_us,
        }
    }

    /// Adopt `learned` latency if it changed, recomputing residency.
    ///
    /// Returns `true` if the state was updated.
    pub fn refresh(&mut self, learned: i32, power_off_time_us: Micros) -> bool {
        if self.exit_latency_us == learned {
            return false;
        }
        self.exit_latency_us = learned;
        self.target_residency_us = learned as Micros + power_off_time_us;
        true
    }
}
