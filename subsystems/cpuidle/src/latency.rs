//! # Exit Latency Model
//!
//! Each slot carries a learned LP2 exit latency. The value starts at the
//! hardware default and is nudged after every LP2 episode that ran to its
//! full budget:
//!
//! ```text
//!   offset  = actual_us - requested_us
//!   latency = clamp(latency + offset / 16, 0, LATENCY_CEILING_US)
//! ```
//!
//! A single noisy measurement moves the estimate by at most 1/16 of the
//! error, so the table tracks systematic bias only. Slots are written by
//! their owning CPU and read by anyone; a stale read self-corrects on the
//! next cycle.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::platform::Micros;
use crate::state::IdleState;
use crate::topology::{CoreIndex, NR_SLOTS};

/// Upper bound of any learned latency
pub const LATENCY_CEILING_US: i32 = 10_000;

/// Feedback divisor (low-pass filter strength)
pub const LATENCY_FEEDBACK_SHIFT: u32 = 4;

/// Per-slot learned exit latencies
#[derive(Debug)]
pub struct LatencyTable {
    latencies: [AtomicI32; NR_SLOTS],
}

impl LatencyTable {
    /// Create a table with every slot at `default_us`
    pub const fn new(default_us: i32) -> Self {
        const ZERO: AtomicI32 = AtomicI32::new(0);
        let mut latencies = [ZERO; NR_SLOTS];
        let mut i = 0;
        while i < NR_SLOTS {
            latencies[i] = AtomicI32::new(clamp_latency(default_us as Micros));
            i += 1;
        }
        Self { latencies }
    }

    /// Reset every slot to the hardware-provided default
    pub fn seed(&self, default_us: i32) {
        let value = clamp_latency(default_us as Micros);
        for slot in &self.latencies {
            slot.store(value, Ordering::Relaxed);
        }
    }

    /// Current learned latency of a slot
    #[inline]
    pub fn effective_latency(&self, core: CoreIndex) -> i32 {
        self.latencies[core.slot()].load(Ordering::Relaxed)
    }

    /// Bring `state` in line with the slot's learned latency.
    ///
    /// The state is shared between cluster modes, so the first use after a
    /// cluster switch picks up the other slot's value here.
    pub fn recommended_residency(
        &self,
        core: CoreIndex,
        state: &mut IdleState,
        power_off_time_us: Micros,
    ) -> Micros {
        state.refresh(self.effective_latency(core), power_off_time_us);
        state.target_residency_us
    }

    /// Fold one completed measurement into the slot, returning the new value
    pub fn update(&self, core: CoreIndex, requested_us: Micros, actual_us: Micros) -> i32 {
        let slot = &self.latencies[core.slot()];
        let offset = actual_us - requested_us;
        let old = slot.load(Ordering::Relaxed) as Micros;
        let latency = clamp_latency(old + offset / (1 << LATENCY_FEEDBACK_SHIFT));
        slot.store(latency, Ordering::Release);
        latency
    }
}

#[inline]
const fn clamp_latency(us: Micros) -> i32 {
    if us < 0 {
        0
    } else if us > LATENCY_CEILING_US as Micros {
        LATENCY_CEILING_US
    } else {
        us as i32
    }
}
