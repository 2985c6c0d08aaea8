//! # Deep-Idle Configuration
//!
//! Tunables are collected once at startup into an [`IdleConfig`] and never
//! change afterwards.
//!
//! | Field                        | Default        | Effect                                   |
//! |------------------------------|----------------|------------------------------------------|
//! | `power_gating_mask`          | all slots      | Slots allowed to enter LP2               |
//! | `lp_cluster_gate_noncpu`     | `false`        | Also gate non-CPU logic on the LP cluster |
//! | `fast_cluster_power_down`    | empty          | Partitions gated by a fast cluster-gate  |
//! | `default_exit_latency_us`    | 200            | Seed for the learned latency table       |
//! | `power_off_time_us`          | 800            | Entry overhead added to residency        |
//! | `cpu_timer_wake`             | `false`        | Wake secondaries from their own timer    |

use crate::error::ConfigError;
use crate::latency::LATENCY_CEILING_US;
use crate::platform::Micros;
use crate::topology::CoreMask;

// ============================================================================
// Cluster Partitions
// ============================================================================

/// Shift of the partition field in the last-CPU power-down flags
pub const CLUSTER_PART_SHIFT: u32 = 20;

bitflags::bitflags! {
    /// Partitions switched off together with the last CPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClusterPart: u32 {
        /// CPU rail (whole fast cluster)
        const CRAIL = 1 << CLUSTER_PART_SHIFT;
        /// Non-CPU cluster logic (L2, SCU)
        const NONCPU = 1 << (CLUSTER_PART_SHIFT + 1);
    }
}

impl ClusterPart {
    /// Decode a raw power-down mode number (0..=3) into partitions.
    ///
    /// Unknown bits are masked off.
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate(mode << CLUSTER_PART_SHIFT)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Deep-idle tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleConfig {
    /// Slots administratively allowed to use LP2
    pub power_gating_mask: CoreMask,
    /// On the low-power cluster, gate non-CPU logic as well as the core
    pub lp_cluster_gate_noncpu: bool,
    /// Partitions a fast-cluster gate switches off; empty disables it
    pub fast_cluster_power_down: ClusterPart,
    /// Hardware exit latency used until measurements refine it
    pub default_exit_latency_us: i32,
    /// Fixed cost of powering a core down, added to exit latency
    pub power_off_time_us: Micros,
    /// Secondary CPUs wake from their own countdown instead of the LP2 trigger
    pub cpu_timer_wake: bool,
}

impl IdleConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            power_gating_mask: CoreMask::all(),
            lp_cluster_gate_noncpu: false,
            fast_cluster_power_down: ClusterPart::empty(),
            default_exit_latency_us: 200,
            power_off_time_us: 800,
            cpu_timer_wake: false,
        }
    }

    /// Check that every field is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=LATENCY_CEILING_US).contains(&self.default_exit_latency_us) {
            return Err(ConfigError::ExitLatencyOutOfRange(
                self.default_exit_latency_us,
            ));
        }
        if self.power_off_time_us < 0 {
            return Err(ConfigError::NegativePowerOffTime(self.power_off_time_us));
        }
        Ok(())
    }

    /// Take the fast-cluster power-down partitions from a raw mode number,
    /// as passed on the kernel command line
    #[inline]
    pub const fn with_cluster_power_down_mode(mut self, mode: u32) -> Self {
        self.fast_cluster_power_down = ClusterPart::from_mode(mode);
        self
    }

    /// Whether the fast cluster may be gated as a whole
    #[inline]
    pub fn cluster_gate_enabled(&self) -> bool {
        !self.fast_cluster_power_down.is_empty()
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self::new()
    }
}
