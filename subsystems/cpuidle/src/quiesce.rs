//! # Quiescence Coordinator
//!
//! Before CPU 0 can switch off a rail it shares with parked peers, every
//! interrupt those peers would normally take has to be steered to CPU 0,
//! otherwise a device interrupt could target a core that no longer exists.
//!
//! ## Hand-off Protocol
//!
//! ```text
//!   1. distributor off ──────────── nobody reacts to / re-routes IRQs
//!   2. rail_off_allowed()? ──no──▶ distributor on, abort (WFI)
//!   3. wake = min(own wake, peer deadlines)
//!      wake - now < residency? ─yes─▶ distributor on, abort (WFI)
//!   4. cancel secondary LP2 wake timers
//!   5. save peer affinity, route everything to CPU 0
//!   6. distributor on
//!            │
//!            ▼
//!      AffinityHandoff (held across the sleep)
//!            │  drop
//!            ▼
//!   distributor off → restore affinity → distributor on
//! ```
//!
//! Disabling the distributor is the only mutual exclusion used; no lock is
//! taken. Failing to restore affinity leaves interrupts permanently
//! misrouted, so it is treated as a fatal invariant violation.

use crate::admission::rail_off_allowed;
use crate::deadline::WakeDeadlines;
use crate::error::AbortReason;
use crate::platform::{InterruptDistributor, Micros, RailControl, WakeTimer};
use crate::topology::CpuId;

/// Peer affinity diverted to the surviving CPU.
///
/// Dropping the hand-off puts the saved routing back.
#[derive(Debug)]
#[must_use = "dropping the hand-off immediately restores affinity"]
pub struct AffinityHandoff<'a, D: InterruptDistributor + ?Sized> {
    dist: &'a D,
}

impl<D: InterruptDistributor + ?Sized> Drop for AffinityHandoff<'_, D> {
    fn drop(&mut self) {
        self.dist.dist_disable();
        if let Err(e) = self.dist.restore_affinity() {
            log::error!("cpuidle: {}", e);
            panic!("cpuidle: interrupt affinity left diverted: {}", e);
        }
        self.dist.dist_enable();
    }
}

/// Outcome of a successful quiesce
#[derive(Debug)]
pub struct Quiesced<'a, D: InterruptDistributor + ?Sized> {
    /// Active affinity hand-off
    pub handoff: AffinityHandoff<'a, D>,
    /// Request shrunk to the earliest peer deadline
    pub request_us: Micros,
}

/// Run the hand-off protocol for `cpu`, which intends to sleep for
/// `request_us` starting at `entry_us`.
pub fn quiesce<'a, P>(
    hw: &'a P,
    deadlines: &WakeDeadlines,
    cpu: CpuId,
    entry_us: Micros,
    request_us: Micros,
    target_residency_us: Micros,
) -> Result<Quiesced<'a, P>, AbortReason>
where
    P: InterruptDistributor + RailControl + WakeTimer + ?Sized,
{
    hw.dist_disable();

    // A peer may have woken between mode selection and now.
    if !rail_off_allowed(hw) {
        hw.dist_enable();
        return Err(AbortReason::RailBusy);
    }

    let wake_time = entry_us
        .saturating_add(request_us)
        .min(deadlines.min_peer_deadline(cpu));
    assert!(wake_time >= 0, "cpuidle: negative wake time {}", wake_time);

    let request_us = wake_time - entry_us;
    if request_us < target_residency_us {
        hw.dist_enable();
        return Err(AbortReason::PeerDeadline);
    }

    hw.cancel_secondary_lp2_timers();
    hw.save_and_route_affinity(cpu);
    hw.dist_enable();

    Ok(Quiesced {
        handoff: AffinityHandoff { dist: hw },
        request_us,
    })
}
