//! # Wake-Deadline Registry
//!
//! Before a secondary CPU powers itself down it publishes the absolute time
//! by which it has to be running again. CPU 0, the last one to sleep, reads
//! these deadlines so that a cluster-wide power down never outlives a peer's
//! scheduled wake.
//!
//! ```text
//!   CPU n (secondary)                      CPU 0 (last)
//!   ─────────────────                      ────────────
//!   store(deadline, Release)
//!   fence(SeqCst)
//!   power down ───────────────┐
//!                             │  rail check sees CPU n gated
//!                             └─────────▶  load(deadline, Acquire)
//!                                          min over peers
//! ```
//!
//! Each slot has a single writer (its own CPU). No lock is taken.

use core::sync::atomic::{fence, AtomicI64, Ordering};

use crate::platform::Micros;
use crate::topology::{CpuId, NR_CPUS};

/// "No deadline" marker
pub const NO_DEADLINE: Micros = Micros::MAX;

/// Per-CPU must-wake-by timestamps
#[derive(Debug)]
pub struct WakeDeadlines {
    wake_by: [AtomicI64; NR_CPUS],
}

impl WakeDeadlines {
    /// Create a registry with no deadlines
    pub const fn new() -> Self {
        const NONE: AtomicI64 = AtomicI64::new(NO_DEADLINE);
        Self {
            wake_by: [NONE; NR_CPUS],
        }
    }

    /// Publish `cpu`'s deadline, visible to peers before this returns
    pub fn publish(&self, cpu: CpuId, wake_by_us: Micros) {
        if let Some(slot) = self.wake_by.get(cpu as usize) {
            slot.store(wake_by_us, Ordering::Release);
            fence(Ordering::SeqCst);
        }
    }

    /// Withdraw `cpu`'s deadline
    pub fn clear(&self, cpu: CpuId) {
        self.publish(cpu, NO_DEADLINE);
    }

    /// Currently published deadline of `cpu`
    pub fn deadline(&self, cpu: CpuId) -> Micros {
        self.wake_by
            .get(cpu as usize)
            .map(|slot| slot.load(Ordering::Acquire))
            .unwrap_or(NO_DEADLINE)
    }

    /// Earliest deadline among all CPUs except `exclude`
    pub fn min_peer_deadline(&self, exclude: CpuId) -> Micros {
        fence(Ordering::Acquire);
        self.wake_by
            .iter()
            .enumerate()
            .filter(|(cpu, _)| *cpu != exclude as usize)
            .map(|(_, slot)| slot.load(Ordering::Acquire))
            .min()
            .unwrap_or(NO_DEADLINE)
    }
}

impl Default for WakeDeadlines {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unbounded_when_empty() {
        let reg = WakeDeadlines::new();
        assert_eq!(reg.min_peer_deadline(0), NO_DEADLINE);
    }

    #[test]
    fn test_min_excludes_caller() {
        let reg = WakeDeadlines::new();
        reg.publish(0, 100);
        reg.publish(2, 5_000);
        reg.publish(3, 4_000);
        assert_eq!(reg.min_peer_deadline(0), 4_000);
        assert_eq!(reg.min_peer_deadline(3), 100);
    }

    #[test]
    fn test_clear_restores_no_deadline() {
        let reg = WakeDeadlines::new();
        reg.publish(1, 42);
        assert_eq!(reg.deadline(1), 42);
        reg.clear(1);
        assert_eq!(reg.deadline(1), NO_DEADLINE);
        assert_eq!(reg.min_peer_deadline(0), NO_DEADLINE);
    }

    #[test]
    fn test_out_of_range_cpu_ignored() {
        let reg = WakeDeadlines::new();
        reg.publish(NR_CPUS as CpuId, 1);
        assert_eq!(reg.deadline(NR_CPUS as CpuId), NO_DEADLINE);
        assert_eq!(reg.min_peer_deadline(0), NO_DEADLINE);
    }

    #[test]
    fn test_never_later_than_published_peer() {
        // Peers keep a fixed floor published and churn a second, earlier
        // deadline on top; the reader must never see past the floor.
        const FLOOR: Micros = 1_000_000;
        let reg = Arc::new(WakeDeadlines::new());
        reg.publish(1, FLOOR);

        let writers: Vec<_> = (2..NR_CPUS as CpuId)
            .map(|cpu| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for i in 0..10_000 {
                        reg.publish(cpu, FLOOR - 1 - (i % 500));
                        reg.clear(cpu);
                    }
                })
            })
            .collect();

        for _ in 0..10_000 {
            assert!(reg.min_peer_deadline(0) <= FLOOR);
        }
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(reg.min_peer_deadline(0), FLOOR);
    }
}
