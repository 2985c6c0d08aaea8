//! # Helix Deep-Idle (LP2) Engine
//!
//! Decides whether a CPU of a Tegra-class SoC may enter LP2 (power-gated
//! idle), picks the flavour of LP2, sequences the transition and learns the
//! real exit latency of every core from the sleeps it completes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               DeepIdle                                  │
//! │                                                                         │
//! │   governor ──▶ is_allowed() ──▶ enter_deep_idle()                       │
//! │                    │                  │                                 │
//! │                    ▼                  ▼                                 │
//! │             ┌────────────┐     ┌──────────────┐     ┌───────────────┐   │
//! │             │ admission  │────▶│   executor   │────▶│    stats      │   │
//! │             └─────┬──────┘     └──┬────────┬──┘     └───────┬───────┘   │
//! │                   │               │        │                │           │
//! │                   ▼               ▼        ▼                ▼           │
//! │             ┌────────────┐  ┌──────────┐ ┌──────────┐  ┌──────────┐     │
//! │             │  latency   │◀─│ quiesce  │ │ deadline │  │  report  │     │
//! │             └────────────┘  └────┬─────┘ └──────────┘  └──────────┘     │
//! │                                  │                                      │
//! └──────────────────────────────────┼──────────────────────────────────────┘
//!                                    ▼
//!                        platform capability traits
//! ```
//!
//! ## Slots
//!
//! | Slot | Meaning                                      |
//! |------|----------------------------------------------|
//! | 0..3 | Fast-cluster CPUs                            |
//! | 4    | The low-power cluster (one CPU, all numbers) |
//!
//! Latency, statistics and the power-gating mask are all indexed by slot;
//! wake deadlines are indexed by CPU number.
//!
//! ## Usage
//!
//! ```ignore
//! let idle = helix_cpuidle::init(IdleConfig::default())?;
//! if idle.is_allowed(&hw, cpu, &mut state) {
//!     idle.enter_deep_idle(&hw, cpu, &mut state);
//! }
//! ```

#![cfg_attr(not(test), no_std)]

// =============================================================================
// Modules
// =============================================================================

pub mod admission;
pub mod config;
pub mod deadline;
pub mod error;
pub mod executor;
pub mod latency;
pub mod platform;
pub mod quiesce;
pub mod report;
pub mod state;
pub mod stats;
pub mod topology;

#[cfg(test)]
mod mock;

// =============================================================================
// Re-exports
// =============================================================================

pub use admission::GateKind;
pub use config::{ClusterPart, IdleConfig};
pub use deadline::{WakeDeadlines, NO_DEADLINE};
pub use error::{AbortReason, AffinityError, ConfigError, IdleError, IdleResult};
pub use executor::{Episode, Outcome};
pub use latency::{LatencyTable, LATENCY_CEILING_US};
pub use platform::{LocalTimerState, Micros, Platform, TimerControl};
pub use report::ReportState;
pub use state::IdleState;
pub use stats::{IdleStats, StatsSnapshot};
pub use topology::{ClusterMode, CoreIndex, CoreMask, CpuId, NR_CPUS, NR_SLOTS};

use core::fmt;

use spin::Once;

use crate::platform::{ClusterControl, IdlePredictor, InterruptDistributor};

// =============================================================================
// Engine
// =============================================================================

/// The deep-idle engine shared by every CPU
#[derive(Debug)]
pub struct DeepIdle {
    config: IdleConfig,
    latencies: LatencyTable,
    deadlines: WakeDeadlines,
    stats: IdleStats,
    report: ReportState,
}

impl DeepIdle {
    /// Build an engine with latencies seeded from the configuration
    pub const fn new(config: IdleConfig) -> Self {
        Self {
            latencies: LatencyTable::new(config.default_exit_latency_us),
            deadlines: WakeDeadlines::new(),
            stats: IdleStats::new(),
            report: ReportState::new(),
            config,
        }
    }

    /// Active configuration
    #[inline]
    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    /// Learned exit latencies
    #[inline]
    pub fn latencies(&self) -> &LatencyTable {
        &self.latencies
    }

    /// Published wake deadlines
    #[inline]
    pub fn deadlines(&self) -> &WakeDeadlines {
        &self.deadlines
    }

    /// Live counters
    #[inline]
    pub fn stats(&self) -> &IdleStats {
        &self.stats
    }

    /// Current learned exit latency of a slot
    #[inline]
    pub fn effective_latency(&self, core: CoreIndex) -> i32 {
        self.latencies.effective_latency(core)
    }

    /// Reset every slot's learned latency to `default_us`
    pub fn seed_latencies(&self, default_us: i32) {
        self.latencies.seed(default_us);
        log::debug!("cpuidle: latencies seeded to {} us", default_us);
    }

    /// Whether LP2 should be offered to the governor for `cpu` right now.
    ///
    /// Refreshes `state` from the learned latency of the slot in use.
    pub fn is_allowed<P>(&self, hw: &P, cpu: CpuId, state: &mut IdleState) -> bool
    where
        P: IdlePredictor + ClusterControl + ?Sized,
    {
        let Some(core) = CoreIndex::for_cpu(cpu, hw.cluster_mode()) else {
            log::warn!("cpuidle: admission query for invalid cpu {}", cpu);
            return false;
        };
        admission::is_allowed(
            &self.config,
            &self.latencies,
            core,
            state,
            hw.sleep_length_us(cpu),
        )
    }

    /// `cpu` became ready for LP2
    pub fn note_ready<C: ClusterControl + ?Sized>(&self, hw: &C, cpu: CpuId) {
        if let Some(core) = CoreIndex::for_cpu(cpu, hw.cluster_mode()) {
            self.stats.record_ready(core);
        }
    }

    /// `cpu` asked for `us` of LP2
    pub fn note_requested_time<C: ClusterControl + ?Sized>(&self, hw: &C, cpu: CpuId, us: Micros) {
        if let Some(core) = CoreIndex::for_cpu(cpu, hw.cluster_mode()) {
            self.stats.record_requested_time(core, us);
        }
    }

    /// Copy of the scalar counters
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Render the diagnostics table into `out`
    pub fn write_report<W, D>(&self, names: &D, out: &mut W) -> fmt::Result
    where
        W: fmt::Write,
        D: InterruptDistributor + ?Sized,
    {
        report::write_report(&self.stats, &self.report, names, out)
    }
}

// =============================================================================
// Global Instance
// =============================================================================

static ENGINE: Once<DeepIdle> = Once::new();

/// Validate `config` and install the global engine.
///
/// Fails if the configuration is unusable or the engine already exists.
pub fn init(config: IdleConfig) -> IdleResult<&'static DeepIdle> {
    config.validate()?;

    let mut installed = false;
    let engine = ENGINE.call_once(|| {
        installed = true;
        DeepIdle::new(config)
    });
    if !installed {
        return Err(IdleError::AlreadyInitialized);
    }

    log::info!(
        "cpuidle: LP2 engine ready (mask {:?}, latency {} us, power-off {} us, cluster gate {:?})",
        config.power_gating_mask,
        config.default_exit_latency_us,
        config.power_off_time_us,
        config.fast_cluster_power_down
    );
    Ok(engine)
}

/// The global engine, once [`init`] has run
#[inline]
pub fn engine() -> Option<&'static DeepIdle> {
    ENGINE.get()
}
