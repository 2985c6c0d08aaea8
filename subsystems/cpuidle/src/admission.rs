//! # LP2 Admission Policy
//!
//! Two questions are answered here:
//!
//! 1. *Is LP2 worth offering at all?* ([`is_allowed`]) The slot must be
//!    enabled in the power-gating mask and the predicted idle time must
//!    cover the state's target residency.
//! 2. *Which flavour?* ([`choose_mode`]) Gating the shared CPU rail is only
//!    safe when CPU 0 is the sole online core and no peer or voltage update
//!    still needs the rail.
//!
//! ## Mode Selection
//!
//! | Cluster  | Cluster gate cfg | CPU | Online | Rail busy | Result          |
//! |----------|------------------|-----|--------|-----------|-----------------|
//! | LowPower | any              | any | any    | any       | ClusterGate     |
//! | Fast     | disabled         | any | any    | any       | SingleCoreGate  |
//! | Fast     | enabled          | ≠0  | any    | any       | SingleCoreGate  |
//! | Fast     | enabled          | 0   | > 1    | any       | SingleCoreGate  |
//! | Fast     | enabled          | 0   | 1      | yes       | SingleCoreGate  |
//! | Fast     | enabled          | 0   | 1      | no        | ClusterGate     |

use crate::config::IdleConfig;
use crate::latency::LatencyTable;
use crate::platform::{Micros, RailControl};
use crate::state::IdleState;
use crate::topology::{ClusterMode, CoreIndex, CpuId, BOOT_CPU, NR_CPUS};

// ============================================================================
// Register Layout
// ============================================================================

/// Bit position of CPU 0's partition in the power-gate status word
pub const PG_CPU_PARTITION_SHIFT: u32 = 8;

/// Every secondary CPU (all cores but the boot CPU)
pub const SECONDARY_CPU_MASK: u32 = ((1 << NR_CPUS) - 1) & !(1 << BOOT_CPU);

// ============================================================================
// Gate Kind
// ============================================================================

/// The two modelled LP2 flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    /// Only the calling core powers down, the rail stays on
    SingleCoreGate,
    /// The calling core is last; the shared rail (or non-CPU logic) goes too
    ClusterGate,
}

// ============================================================================
// Policy
// ============================================================================

/// Whether LP2 should be offered for this predicted idle period
pub fn is_allowed(
    config: &IdleConfig,
    latencies: &LatencyTable,
    core: CoreIndex,
    state: &mut IdleState,
    predicted_idle_us: Micros,
) -> bool {
    if !config.power_gating_mask.allows(core) {
        return false;
    }

    let residency = latencies.recommended_residency(core, state, config.power_off_time_us);
    predicted_idle_us >= residency
}

/// Pick the LP2 flavour. Pure: same inputs, same answer.
pub fn choose_mode(
    config: &IdleConfig,
    cpu: CpuId,
    cluster_mode: ClusterMode,
    online_cpus: u32,
    rail_busy: bool,
) -> GateKind {
    if cluster_mode.is_low_power() {
        return GateKind::ClusterGate;
    }

    if !config.cluster_gate_enabled() || cpu != BOOT_CPU || online_cpus > 1 || rail_busy {
        GateKind::SingleCoreGate
    } else {
        GateKind::ClusterGate
    }
}

/// Whether the shared CPU rail may be switched off right now.
///
/// Reads the hardware every time; the answer can change between calls.
pub fn rail_off_allowed<R: RailControl + ?Sized>(rail: &R) -> bool {
    let rst = rail.cpu_complex_status();
    let pg = rail.powergate_status() >> PG_CPU_PARTITION_SHIFT;

    if (rst & SECONDARY_CPU_MASK) != SECONDARY_CPU_MASK || (pg & SECONDARY_CPU_MASK) != 0 {
        return false;
    }

    !rail.rail_updating()
}
