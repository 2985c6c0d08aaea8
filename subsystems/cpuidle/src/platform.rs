//! # Platform Capabilities
//!
//! The engine never touches hardware directly. Everything it needs from the
//! SoC, the interrupt controller and the rest of the kernel is expressed as
//! a small capability trait, and [`Platform`] bundles them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           DeepIdle engine                            │
//! └───┬─────────┬─────────┬──────────┬─────────┬────────┬────────┬───────┘
//!     │         │         │          │         │        │        │
//!     ▼         ▼         ▼          ▼         ▼        ▼        ▼
//!  Idle-    Cluster    Rail     Interrupt    Wake     PM /    Power
//!  Predictor Control  Control  Distributor  Timer   Notifier   Ops
//!  (tick)   (online)  (PMC,    (GICD ctlr,  (CNTP,   (cpu_pm, (WFI,
//!                     DVFS)    affinity)    LP2 tmr) bcast)   suspend)
//! ```
//!
//! All methods take `&self`; implementations are expected to use whatever
//! interior mutability the underlying registers need.

use crate::config::ClusterPart;
use crate::error::AffinityError;
use crate::topology::{ClusterMode, CpuId};

/// Microseconds, signed so that deadlines in the past stay representable
pub type Micros = i64;

// ============================================================================
// Local Timer State
// ============================================================================

bitflags::bitflags! {
    /// Generic timer control register bits (CNTP_CTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerControl: u32 {
        /// Timer enabled
        const ENABLE = 1 << 0;
        /// Timer interrupt masked
        const IT_MASK = 1 << 1;
        /// Timer condition met
        const ISTATUS = 1 << 2;
    }
}

/// Snapshot of a CPU's private countdown timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimerState {
    /// Control register
    pub ctl: TimerControl,
    /// Remaining ticks (signed countdown, `<= 0` once expired)
    pub tval: i64,
    /// Counter frequency in Hz
    pub freq_hz: u64,
}

impl LocalTimerState {
    /// Timer is enabled and its interrupt can fire
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.ctl.contains(TimerControl::ENABLE) && !self.ctl.contains(TimerControl::IT_MASK)
    }

    /// Countdown already reached zero or the timer condition latched
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.tval <= 0 || self.ctl.contains(TimerControl::ISTATUS)
    }

    /// Remaining countdown in microseconds
    #[inline]
    pub fn remaining_us(&self) -> Micros {
        if self.freq_hz == 0 {
            return 0;
        }
        ((self.tval as i128 * 1_000_000) / self.freq_hz as i128) as Micros
    }

    /// Counter ticks per microsecond
    #[inline]
    pub fn ticks_per_us(&self) -> i64 {
        (self.freq_hz / 1_000_000) as i64
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Idle governor view of the next scheduled event
pub trait IdlePredictor {
    /// Time until this CPU's next scheduled event
    fn sleep_length_us(&self, cpu: CpuId) -> Micros;

    /// Whether the periodic tick is stopped (no-HZ active) on this CPU
    fn nohz_active(&self, cpu: CpuId) -> bool;
}

/// Cluster configuration and CPU bookkeeping
pub trait ClusterControl {
    /// Cluster the system currently runs on
    fn cluster_mode(&self) -> ClusterMode;

    /// Number of online CPUs
    fn online_cpus(&self) -> u32;

    /// Mark a CPU as being inside the LP2 path
    fn set_cpu_in_lp2(&self, cpu: CpuId);

    /// Clear the LP2 mark
    fn clear_cpu_in_lp2(&self, cpu: CpuId);
}

/// CPU rail and partition status
pub trait RailControl {
    /// Clock-and-reset CPU complex status word (bit n set: CPU n in reset)
    fn cpu_complex_status(&self) -> u32;

    /// PMC power-gate status word (CPU partitions start at bit 8)
    fn powergate_status(&self) -> u32;

    /// A voltage update of the CPU rail is in flight
    fn rail_updating(&self) -> bool;

    /// Switch the CPU rail off at `now`
    fn rail_off(&self, now: Micros);

    /// Switch the CPU rail back on at `now`
    fn rail_on(&self, now: Micros);
}

/// Interrupt distributor control
pub trait InterruptDistributor {
    /// Stop forwarding interrupts to any CPU interface
    fn dist_disable(&self);

    /// Resume forwarding interrupts
    fn dist_enable(&self);

    /// Save every peer's routing and send all interrupts to `target`
    fn save_and_route_affinity(&self, target: CpuId);

    /// Put back the routing saved by [`Self::save_and_route_affinity`]
    fn restore_affinity(&self) -> Result<(), AffinityError>;

    /// Highest-priority pending interrupt, if any
    fn pending_interrupt(&self) -> Option<u32>;

    /// Human-readable handler name for diagnostics
    fn irq_name(&self, _irq: u32) -> Option<&'static str> {
        None
    }
}

/// Per-CPU countdown and the LP2 wake trigger
pub trait WakeTimer {
    /// Read the calling CPU's private timer, `None` if unavailable
    fn local_timer(&self) -> Option<LocalTimerState>;

    /// Reprogram the calling CPU's private countdown
    fn set_local_timer_value(&self, tval: i64);

    /// Save and stop the private timer across power down
    fn suspend_local_timer(&self);

    /// Restore the private timer after power up
    fn resume_local_timer(&self);

    /// The LP2 wake timer for this CPU can be armed
    fn lp2_timer_ready(&self, cpu: CpuId) -> bool;

    /// Arm (or with 0, disarm) the LP2 wake trigger
    fn set_lp2_trigger(&self, sleep_us: Micros);

    /// Time left on the LP2 wake trigger
    fn lp2_timer_remaining(&self) -> Micros;

    /// Cancel the LP2 wake timers of every secondary CPU
    fn cancel_secondary_lp2_timers(&self);
}

/// Kernel notifications around power transitions
pub trait PmNotifier {
    /// CPU context is about to be lost
    fn cpu_pm_enter(&self);

    /// CPU context is back
    fn cpu_pm_exit(&self);

    /// Hand the tick over to the broadcast timer
    fn broadcast_enter(&self, cpu: CpuId);

    /// Take the tick back from the broadcast timer
    fn broadcast_exit(&self, cpu: CpuId);
}

/// Low-level power primitives
pub trait PowerOps {
    /// Shallow idle (wait for interrupt)
    fn wfi(&self);

    /// Power the calling secondary CPU down; returns on wake
    fn suspend_secondary(&self, cpu: CpuId);

    /// Deepest state for the last running CPU.
    ///
    /// Returns 0 when the sleep budget ran out, non-zero when an interrupt
    /// woke the CPU early.
    fn enter_lp2_last(&self, sleep_us: Micros, parts: ClusterPart) -> i32;
}

/// Monotonic time source
pub trait Clock {
    /// Microseconds since an arbitrary epoch
    fn now_us(&self) -> Micros;
}

/// Everything the engine needs from the platform
pub trait Platform:
    IdlePredictor
    + ClusterControl
    + RailControl
    + InterruptDistributor
    + WakeTimer
    + PmNotifier
    + PowerOps
    + Clock
{
}

impl<T> Platform for T where
    T: IdlePredictor
        + ClusterControl
        + RailControl
        + InterruptDistributor
        + WakeTimer
        + PmNotifier
        + PowerOps
        + Clock
{
}
