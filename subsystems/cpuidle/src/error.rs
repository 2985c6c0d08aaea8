//! # Error Types
//!
//! Nothing in the deep-idle path is fatal to the caller. Every refusal to
//! enter LP2 is an [`AbortReason`] that the executor resolves locally by
//! falling back to a plain WFI and returning `false`.
//!
//! | Type             | Surfaces through          | Recovery                  |
//! |------------------|---------------------------|---------------------------|
//! | `AbortReason`    | `bool` from entry points  | WFI, retry next idle      |
//! | `ConfigError`    | `init()`                  | Fix configuration         |
//! | `AffinityError`  | panic                     | None (misrouted IRQs)     |

use core::fmt;

use crate::topology::CpuId;

/// Result type for engine setup
pub type IdleResult<T> = Result<T, IdleError>;

// ============================================================================
// Setup Errors
// ============================================================================

/// Errors reported while bringing the engine up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleError {
    /// Configuration failed validation
    InvalidConfig(ConfigError),
    /// The global engine was already initialized
    AlreadyInitialized,
}

impl fmt::Display for IdleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleError::InvalidConfig(e) => write!(f, "invalid cpuidle configuration: {}", e),
            IdleError::AlreadyInitialized => f.write_str("cpuidle engine already initialized"),
        }
    }
}

impl From<ConfigError> for IdleError {
    fn from(e: ConfigError) -> Self {
        IdleError::InvalidConfig(e)
    }
}

/// Configuration validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Default exit latency outside `[0, LATENCY_CEILING_US]`
    ExitLatencyOutOfRange(i32),
    /// Negative power-off overhead
    NegativePowerOffTime(i64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ExitLatencyOutOfRange(us) => {
                write!(f, "default exit latency {}us out of range", us)
            },
            ConfigError::NegativePowerOffTime(us) => {
                write!(f, "power-off time {}us is negative", us)
            },
        }
    }
}

// ============================================================================
// Abort Reasons
// ============================================================================

/// Why an LP2 attempt fell back to shallow idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// CPU number outside the fast cluster
    InvalidCpu(CpuId),
    /// Predicted idle shorter than the target residency
    InsufficientResidency,
    /// Local countdown already expired
    TimerExpired,
    /// Local countdown disabled or masked
    TimerDisabled,
    /// Per-CPU LP2 wake timer not ready
    WakeTimerNotReady,
    /// Tick still running on this CPU
    TickActive,
    /// A peer left power gating or the rail is being updated
    RailBusy,
    /// A peer's deadline left too little time
    PeerDeadline,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::InvalidCpu(cpu) => write!(f, "invalid cpu {}", cpu),
            AbortReason::InsufficientResidency => f.write_str("not enough time left"),
            AbortReason::TimerExpired => f.write_str("local timer expired"),
            AbortReason::TimerDisabled => f.write_str("local timer disabled"),
            AbortReason::WakeTimerNotReady => f.write_str("lp2 wake timer not ready"),
            AbortReason::TickActive => f.write_str("tick not stopped"),
            AbortReason::RailBusy => f.write_str("rail off not allowed"),
            AbortReason::PeerDeadline => f.write_str("peer wakes too soon"),
        }
    }
}

// ============================================================================
// Affinity Errors
// ============================================================================

/// The interrupt controller could not restore saved affinity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffinityError {
    /// First interrupt whose routing could not be restored
    pub irq: u32,
}

impl fmt::Display for AffinityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to restore affinity of irq {}", self.irq)
    }
}
