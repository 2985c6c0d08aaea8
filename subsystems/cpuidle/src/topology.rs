//! # Core Topology and Statistics Slots
//!
//! The deep-idle tables are indexed by *slot*, not by CPU number. The fast
//! cluster exposes one slot per physical core; when the system has collapsed
//! onto the low-power companion core, every CPU number folds onto a single
//! extra slot.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Slot Layout                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │   ClusterMode::Fast              ClusterMode::LowPower        │
//! │                                                              │
//! │   CPU 0 ──▶ slot 0               CPU n ──┐                   │
//! │   CPU 1 ──▶ slot 1                       │                   │
//! │   CPU 2 ──▶ slot 2                       ▼                   │
//! │   CPU 3 ──▶ slot 3               slot 4 (LowPower)           │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use static_assertions::const_assert;

// ============================================================================
// Topology Constants
// ============================================================================

/// Number of physical cores in the fast cluster
pub const NR_CPUS: usize = 4;

/// Number of latency/statistics slots (one per core plus the LP slot)
pub const NR_SLOTS: usize = NR_CPUS + 1;

/// Slot used by every CPU while running on the low-power cluster
pub const LP_SLOT: usize = NR_CPUS;

/// The only core allowed to initiate a cluster-wide power down
pub const BOOT_CPU: CpuId = 0;

const_assert!(NR_CPUS <= 8);
const_assert!(LP_SLOT < NR_SLOTS);

/// Physical CPU number
pub type CpuId = u32;

// ============================================================================
// Cluster Mode
// ============================================================================

/// Which CPU cluster the system is currently running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterMode {
    /// High-performance multi-core cluster
    Fast,
    /// Single low-power companion core (fast cluster fully gated)
    LowPower,
}

impl ClusterMode {
    /// Check if this is the collapsed low-power configuration
    #[inline]
    pub const fn is_low_power(self) -> bool {
        matches!(self, ClusterMode::LowPower)
    }
}

// ============================================================================
// Core Index
// ============================================================================

/// Slot identity for the per-core latency and statistics tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreIndex {
    /// Physical core of the fast cluster
    Cpu(u8),
    /// The collapsed low-power cluster
    LowPower,
}

impl CoreIndex {
    /// Map a CPU number to its slot for the given cluster mode.
    ///
    /// Returns `None` for CPU numbers outside the fast cluster.
    #[inline]
    pub fn for_cpu(cpu: CpuId, mode: ClusterMode) -> Option<Self> {
        if cpu as usize >= NR_CPUS {
            return None;
        }
        Some(match mode {
            ClusterMode::LowPower => CoreIndex::LowPower,
            ClusterMode::Fast => CoreIndex::Cpu(cpu as u8),
        })
    }

    /// Table index for this slot
    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            CoreIndex::Cpu(n) => n as usize,
            CoreIndex::LowPower => LP_SLOT,
        }
    }

    /// Iterate over every slot in table order
    pub fn all() -> impl Iterator<Item = CoreIndex> {
        (0..NR_CPUS as u8)
            .map(CoreIndex::Cpu)
            .chain(core::iter::once(CoreIndex::LowPower))
    }
}

// ============================================================================
// Core Mask
// ============================================================================

bitflags::bitflags! {
    /// Slots allowed to use deep idle at all
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreMask: u32 {
        /// Fast cluster core 0
        const CPU0 = 1 << 0;
        /// Fast cluster core 1
        const CPU1 = 1 << 1;
        /// Fast cluster core 2
        const CPU2 = 1 << 2;
        /// Fast cluster core 3
        const CPU3 = 1 << 3;
        /// Low-power companion core
        const LP_CPU = 1 << 4;
    }
}

impl CoreMask {
    /// Mask bit for a single slot
    #[inline]
    pub const fn for_index(index: CoreIndex) -> Self {
        Self::from_bits_truncate(1 << index.slot())
    }

    /// Check whether a slot is enabled
    #[inline]
    pub fn allows(self, index: CoreIndex) -> bool {
        self.contains(Self::for_index(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_cluster_maps_one_to_one() {
        for cpu in 0..NR_CPUS as CpuId {
            let idx = CoreIndex::for_cpu(cpu, ClusterMode::Fast).unwrap();
            assert_eq!(idx.slot(), cpu as usize);
        }
    }

    #[test]
    fn test_low_power_collapses_to_lp_slot() {
        for cpu in 0..NR_CPUS as CpuId {
            let idx = CoreIndex::for_cpu(cpu, ClusterMode::LowPower).unwrap();
            assert_eq!(idx, CoreIndex::LowPower);
            assert_eq!(idx.slot(), LP_SLOT);
        }
    }

    #[test]
    fn test_out_of_range_cpu() {
        assert_eq!(CoreIndex::for_cpu(NR_CPUS as CpuId, ClusterMode::Fast), None);
        assert_eq!(CoreIndex::for_cpu(99, ClusterMode::LowPower), None);
    }

    #[test]
    fn test_mask_bits_follow_slots() {
        assert_eq!(CoreMask::all().bits(), 0x1f);
        assert!(CoreMask::LP_CPU.allows(CoreIndex::LowPower));
        assert!(!CoreMask::CPU0.allows(CoreIndex::Cpu(1)));
        assert_eq!(CoreIndex::all().count(), NR_SLOTS);
    }
}
