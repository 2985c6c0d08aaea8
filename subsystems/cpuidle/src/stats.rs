//! # LP2 Statistics
//!
//! Append-only counters describing how deep idle is being used. They are
//! written from every CPU without synchronization; a lost increment is
//! acceptable because nothing but diagnostics reads them.
//!
//! Durations are binned by `fls(milliseconds)`, so bin `b` covers
//! `[2^(b-1), 2^b)` ms and bin 0 holds sub-millisecond requests.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use static_assertions::const_assert;

use crate::platform::Micros;
use crate::topology::{CoreIndex, NR_SLOTS};

/// Number of log2 duration bins
pub const NR_BINS: usize = 32;

/// Interrupt lines tracked for early-wake attribution
pub const NR_IRQS: usize = 512;

const_assert!(NR_BINS <= 32);

/// Histogram bin for a duration in milliseconds
#[inline]
pub const fn time_to_bin(ms: u32) -> usize {
    let bin = (u32::BITS - ms.leading_zeros()) as usize;
    if bin >= NR_BINS {
        NR_BINS - 1
    } else {
        bin
    }
}

/// Histogram bin for a request in microseconds
#[inline]
pub fn request_bin(request_us: Micros) -> usize {
    let ms = (request_us.max(0) / 1000).min(u32::MAX as Micros) as u32;
    time_to_bin(ms)
}

// ============================================================================
// Counters
// ============================================================================

/// Live counters, shared by all CPUs
#[derive(Debug)]
pub struct IdleStats {
    cpu_ready_count: [AtomicU32; NR_SLOTS],
    tear_down_count: [AtomicU32; NR_SLOTS],
    cpu_wants_lp2_time: [AtomicU64; NR_SLOTS],
    in_lp2_time: [AtomicU64; NR_SLOTS],
    lp2_count: AtomicU32,
    lp2_completed_count: AtomicU32,
    lp2_count_bin: [AtomicU32; NR_BINS],
    lp2_completed_count_bin: [AtomicU32; NR_BINS],
    lp2_int_count: [AtomicU32; NR_IRQS],
    lp2_unknown_int_count: AtomicU32,
}

impl IdleStats {
    /// Create zeroed counters
    pub const fn new() -> Self {
        const Z32: AtomicU32 = AtomicU32::new(0);
        const Z64: AtomicU64 = AtomicU64::new(0);
        Self {
            cpu_ready_count: [Z32; NR_SLOTS],
            tear_down_count: [Z32; NR_SLOTS],
            cpu_wants_lp2_time: [Z64; NR_SLOTS],
            in_lp2_time: [Z64; NR_SLOTS],
            lp2_count: Z32,
            lp2_completed_count: Z32,
            lp2_count_bin: [Z32; NR_BINS],
            lp2_completed_count_bin: [Z32; NR_BINS],
            lp2_int_count: [Z32; NR_IRQS],
            lp2_unknown_int_count: Z32,
        }
    }

    /// A slot became ready for LP2
    #[inline]
    pub fn record_ready(&self, core: CoreIndex) {
        self.cpu_ready_count[core.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// A slot asked for `us` of LP2
    #[inline]
    pub fn record_requested_time(&self, core: CoreIndex, us: Micros) {
        self.cpu_wants_lp2_time[core.slot()].fetch_add(us.max(0) as u64, Ordering::Relaxed);
    }

    /// A slot started tearing its context down
    #[inline]
    pub fn record_tear_down(&self, core: CoreIndex) {
        self.tear_down_count[core.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// An LP2 sleep was issued for a request falling in `bin`
    #[inline]
    pub fn record_attempt(&self, bin: usize) {
        self.lp2_count.fetch_add(1, Ordering::Relaxed);
        self.lp2_count_bin[bin.min(NR_BINS - 1)].fetch_add(1, Ordering::Relaxed);
    }

    /// The sleep in `bin` ran its full budget
    #[inline]
    pub fn record_completion(&self, bin: usize) {
        self.lp2_completed_count.fetch_add(1, Ordering::Relaxed);
        self.lp2_completed_count_bin[bin.min(NR_BINS - 1)].fetch_add(1, Ordering::Relaxed);
    }

    /// A slot spent `us` in LP2
    #[inline]
    pub fn record_lp2_time(&self, core: CoreIndex, us: Micros) {
        self.in_lp2_time[core.slot()].fetch_add(us.max(0) as u64, Ordering::Relaxed);
    }

    /// The sleep was cut short by `irq`
    pub fn record_wake_interrupt(&self, irq: Option<u32>) {
        match irq.and_then(|irq| self.lp2_int_count.get(irq as usize)) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            None => {
                self.lp2_unknown_int_count.fetch_add(1, Ordering::Relaxed);
            },
        }
    }

    /// Early wakes attributed to `irq`
    #[inline]
    pub fn interrupt_count(&self, irq: u32) -> u32 {
        self.lp2_int_count
            .get(irq as usize)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Early wakes with no identifiable source
    #[inline]
    pub fn unknown_interrupt_count(&self) -> u32 {
        self.lp2_unknown_int_count.load(Ordering::Relaxed)
    }

    /// Interrupts with at least one attributed early wake
    pub fn interrupt_attributions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.lp2_int_count
            .iter()
            .enumerate()
            .map(|(irq, c)| (irq as u32, c.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count != 0)
    }

    /// Copy the scalar counters out
    pub fn snapshot(&self) -> StatsSnapshot {
        fn load32<const N: usize>(src: &[AtomicU32; N]) -> [u32; N] {
            let mut out = [0; N];
            for (o, s) in out.iter_mut().zip(src) {
                *o = s.load(Ordering::Relaxed);
            }
            out
        }
        fn load64<const N: usize>(src: &[AtomicU64; N]) -> [u64; N] {
            let mut out = [0; N];
            for (o, s) in out.iter_mut().zip(src) {
                *o = s.load(Ordering::Relaxed);
            }
            out
        }

        StatsSnapshot {
            cpu_ready_count: load32(&self.cpu_ready_count),
            tear_down_count: load32(&self.tear_down_count),
            cpu_wants_lp2_time: load64(&self.cpu_wants_lp2_time),
            in_lp2_time: load64(&self.in_lp2_time),
            lp2_count: self.lp2_count.load(Ordering::Relaxed),
            lp2_completed_count: self.lp2_completed_count.load(Ordering::Relaxed),
            lp2_count_bin: load32(&self.lp2_count_bin),
            lp2_completed_count_bin: load32(&self.lp2_completed_count_bin),
            lp2_unknown_int_count: self.lp2_unknown_int_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for IdleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of the scalar counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Times each slot became LP2-ready
    pub cpu_ready_count: [u32; NR_SLOTS],
    /// Times each slot tore its context down
    pub tear_down_count: [u32; NR_SLOTS],
    /// Requested LP2 time per slot (µs)
    pub cpu_wants_lp2_time: [u64; NR_SLOTS],
    /// Time actually spent in LP2 per slot (µs)
    pub in_lp2_time: [u64; NR_SLOTS],
    /// LP2 sleeps issued
    pub lp2_count: u32,
    /// LP2 sleeps that ran their full budget
    pub lp2_completed_count: u32,
    /// Issued sleeps per duration bin
    pub lp2_count_bin: [u32; NR_BINS],
    /// Completed sleeps per duration bin
    pub lp2_completed_count_bin: [u32; NR_BINS],
    /// Early wakes with no identifiable source
    pub lp2_unknown_int_count: u32,
}

impl StatsSnapshot {
    /// Completed sleeps as a percentage of issued ones
    pub fn completion_percent(&self) -> u32 {
        percent(self.lp2_completed_count as u64, self.lp2_count as u64)
    }

    /// Share of requested time actually spent in LP2 for a slot
    pub fn residency_percent(&self, core: CoreIndex) -> u32 {
        let slot = core.slot();
        percent(self.in_lp2_time[slot], self.cpu_wants_lp2_time[slot])
    }
}

#[inline]
pub(crate) fn percent(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        0
    } else {
        (part.saturating_mul(100) / whole) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_bin_is_fls() {
        assert_eq!(time_to_bin(0), 0);
        assert_eq!(time_to_bin(1), 1);
        assert_eq!(time_to_bin(2), 2);
        assert_eq!(time_to_bin(3), 2);
        assert_eq!(time_to_bin(10), 4);
        assert_eq!(time_to_bin(80), 7);
        assert_eq!(time_to_bin(u32::MAX), NR_BINS - 1);
    }

    #[test]
    fn test_request_bin() {
        assert_eq!(request_bin(999), 0);
        assert_eq!(request_bin(10_000), 4);
        assert_eq!(request_bin(-5), 0);
        assert_eq!(request_bin(Micros::MAX), NR_BINS - 1);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = IdleStats::new();
        stats.record_ready(CoreIndex::Cpu(1));
        stats.record_ready(CoreIndex::Cpu(1));
        stats.record_requested_time(CoreIndex::Cpu(1), 4000);
        stats.record_lp2_time(CoreIndex::Cpu(1), 3000);
        stats.record_attempt(4);
        stats.record_attempt(4);
        stats.record_completion(4);

        let snap = stats.snapshot();
        assert_eq!(snap.cpu_ready_count[1], 2);
        assert_eq!(snap.lp2_count, 2);
        assert_eq!(snap.lp2_completed_count, 1);
        assert_eq!(snap.lp2_count_bin[4], 2);
        assert_eq!(snap.lp2_completed_count_bin[4], 1);
        assert_eq!(snap.completion_percent(), 50);
        assert_eq!(snap.residency_percent(CoreIndex::Cpu(1)), 75);
        assert_eq!(snap.residency_percent(CoreIndex::Cpu(2)), 0);
    }

    #[test]
    fn test_interrupt_attribution() {
        let stats = IdleStats::new();
        stats.record_wake_interrupt(Some(61));
        stats.record_wake_interrupt(Some(61));
        stats.record_wake_interrupt(Some(1023));
        stats.record_wake_interrupt(None);

        assert_eq!(stats.interrupt_count(61), 2);
        assert_eq!(stats.unknown_interrupt_count(), 2);
        let attributed: Vec<_> = stats.interrupt_attributions().collect();
        assert_eq!(attributed, vec![(61, 2)]);
    }

    #[test]
    fn test_empty_percentages() {
        let snap = IdleStats::new().snapshot();
        assert_eq!(snap.completion_percent(), 0);
    }
}
