//! # LP2 Transition Executor
//!
//! One attempt walks the same state machine for both gate kinds:
//!
//! ```text
//!   Idle ──▶ Evaluating ──abort──▶ WFI ──▶ Idle
//!                │
//!                ▼
//!            Entering  (cpu_pm enter, deadline/affinity/rail ops)
//!                │
//!                ▼
//!             Asleep   (suspend_secondary | enter_lp2_last)
//!                │
//!                ▼
//!             Exiting  (rail/affinity restore, stats, latency feedback,
//!                │      cpu_pm exit)
//!                ▼
//!              Idle
//! ```
//!
//! Only the middle of the machine differs between a single-core gate (the
//! CPU's own partition, rail stays up) and a cluster gate (the last CPU
//! takes the rail or the non-CPU logic down with it). Only an episode that
//! slept its whole budget feeds the latency model.

use crate::admission::{choose_mode, rail_off_allowed, GateKind};
use crate::config::ClusterPart;
use crate::error::AbortReason;
use crate::platform::{Micros, Platform, PmNotifier};
use crate::quiesce::quiesce;
use crate::state::IdleState;
use crate::stats::request_bin;
use crate::topology::{ClusterMode, CoreIndex, CpuId};
use crate::DeepIdle;

// ============================================================================
// Episode
// ============================================================================

/// How an LP2 sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Slept until the programmed wake
    Completed,
    /// Woken early by an interrupt
    Interrupted {
        /// Pending interrupt at wake, if one could be identified
        irq: Option<u32>,
    },
}

/// Record of one LP2 attempt that actually slept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Episode {
    /// Gate flavour used
    pub kind: GateKind,
    /// Slot charged for the attempt
    pub core: CoreIndex,
    /// Sleep the hardware was expected to deliver, exit latency included
    pub requested_us: Micros,
    /// Measured time from entry to exit
    pub elapsed_us: Micros,
    /// Histogram bin of the request
    pub bin: usize,
    /// Completion or early wake
    pub outcome: Outcome,
}

impl Episode {
    /// Whether the sleep ran its full budget
    #[inline]
    pub fn completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed)
    }
}

// ============================================================================
// PM Notifier Scope
// ============================================================================

/// `cpu_pm_enter()` / `cpu_pm_exit()` bracket
struct PmScope<'a, N: PmNotifier + ?Sized>(&'a N);

impl<'a, N: PmNotifier + ?Sized> PmScope<'a, N> {
    fn enter(notifier: &'a N) -> Self {
        notifier.cpu_pm_enter();
        Self(notifier)
    }
}

impl<N: PmNotifier + ?Sized> Drop for PmScope<'_, N> {
    fn drop(&mut self) {
        self.0.cpu_pm_exit();
    }
}

// ============================================================================
// Executor
// ============================================================================

impl DeepIdle {
    /// Enter LP2 on `cpu`, choosing the gate kind automatically.
    ///
    /// Returns `true` if the CPU went through an LP2 sleep (completed or cut
    /// short), `false` if it fell back to WFI.
    pub fn enter_deep_idle<P: Platform + ?Sized>(
        &self,
        hw: &P,
        cpu: CpuId,
        state: &mut IdleState,
    ) -> bool {
        let mode = hw.cluster_mode();
        if CoreIndex::for_cpu(cpu, mode).is_none() {
            log::warn!("cpuidle: lp2 requested for invalid cpu {}", cpu);
            return false;
        }

        hw.set_cpu_in_lp2(cpu);
        let kind = choose_mode(
            &self.config,
            cpu,
            mode,
            hw.online_cpus(),
            !rail_off_allowed(hw),
        );
        let entered = self.attempt(hw, cpu, kind, state).is_ok();
        hw.clear_cpu_in_lp2(cpu);

        entered
    }

    /// Run one LP2 attempt of the given kind.
    ///
    /// On any abort the CPU has already executed WFI when this returns.
    /// The caller is responsible for `kind` being safe for `cpu`.
    pub(crate) fn attempt<P: Platform + ?Sized>(
        &self,
        hw: &P,
        cpu: CpuId,
        kind: GateKind,
        state: &mut IdleState,
    ) -> Result<Episode, AbortReason> {
        let mode = hw.cluster_mode();
        let core = CoreIndex::for_cpu(cpu, mode).ok_or(AbortReason::InvalidCpu(cpu))?;
        self.latencies
            .recommended_residency(core, state, self.config.power_off_time_us);

        let request = hw.sleep_length_us(cpu);
        let result = match kind {
            GateKind::SingleCoreGate => self.core_power_down(hw, cpu, core, state, request),
            GateKind::ClusterGate => self.cluster_power_down(hw, cpu, core, mode, state, request),
        };

        if let Err(reason) = result {
            log::trace!("cpuidle: cpu{} {:?} aborted: {}", cpu, kind, reason);
            hw.wfi();
        }
        result
    }

    /// Power down the calling secondary CPU, leaving the rail up
    fn core_power_down<P: Platform + ?Sized>(
        &self,
        hw: &P,
        cpu: CpuId,
        core: CoreIndex,
        state: &mut IdleState,
        mut request: Micros,
    ) -> Result<Episode, AbortReason> {
        let cpu_timer = self.config.cpu_timer_wake;

        // Countdown value to program in CPU-timer mode. Nothing is written
        // to the hardware until every guard below has passed.
        let mut pulled_in = None;
        match hw.local_timer() {
            Some(timer) => {
                if !timer.is_armed() {
                    return Err(AbortReason::TimerDisabled);
                }
                if timer.is_expired() {
                    return Err(AbortReason::TimerExpired);
                }
                request = timer.remaining_us();
                if cpu_timer {
                    pulled_in =
                        Some(timer.tval - state.exit_latency_us as i64 * timer.ticks_per_us());
                }
            },
            // Without its own countdown the CPU has nothing to wake it.
            None if cpu_timer => return Err(AbortReason::WakeTimerNotReady),
            None => {},
        }

        if !hw.lp2_timer_ready(cpu) {
            return Err(AbortReason::WakeTimerNotReady);
        }
        if request < state.target_residency_us {
            return Err(AbortReason::InsufficientResidency);
        }
        if !hw.nohz_active(cpu) {
            return Err(AbortReason::TickActive);
        }

        if let Some(tval) = pulled_in {
            hw.set_local_timer_value(tval);
        }

        let pm = PmScope::enter(hw);

        if !cpu_timer {
            hw.broadcast_enter(cpu);
            hw.suspend_local_timer();
            hw.set_lp2_trigger(request - state.exit_latency_us as Micros);
        }

        let bin = request_bin(request);
        self.stats.record_tear_down(core);
        self.stats.record_attempt(bin);

        let entry = hw.now_us();
        self.deadlines.publish(cpu, entry.saturating_add(request));

        hw.suspend_secondary(cpu);

        self.deadlines.clear(cpu);

        let completed = if cpu_timer {
            hw.local_timer().is_some_and(|t| t.is_expired())
        } else {
            let remaining = hw.lp2_timer_remaining();
            hw.set_lp2_trigger(0);
            hw.resume_local_timer();
            hw.broadcast_exit(cpu);
            remaining <= 0
        };

        let outcome = if completed {
            Outcome::Completed
        } else {
            Outcome::Interrupted {
                irq: hw.pending_interrupt(),
            }
        };

        let episode = Episode {
            kind: GateKind::SingleCoreGate,
            core,
            requested_us: request,
            elapsed_us: hw.now_us() - entry,
            bin,
            outcome,
        };
        self.finish(state, &episode);
        drop(pm);

        Ok(episode)
    }

    /// Power down the last running CPU together with the cluster
    fn cluster_power_down<P: Platform + ?Sized>(
        &self,
        hw: &P,
        cpu: CpuId,
        core: CoreIndex,
        mode: ClusterMode,
        state: &mut IdleState,
        request: Micros,
    ) -> Result<Episode, AbortReason> {
        let entry = hw.now_us();

        if request < state.target_residency_us {
            return Err(AbortReason::InsufficientResidency);
        }

        self.stats.record_tear_down(core);

        let multi_cpu_entry = !mode.is_low_power() && hw.online_cpus() > 1;
        let (handoff, request) = if multi_cpu_entry {
            let q = quiesce(
                hw,
                &self.deadlines,
                cpu,
                entry,
                request,
                state.target_residency_us,
            )?;
            (Some(q.handoff), q.request_us)
        } else {
            (None, request)
        };

        let pm = PmScope::enter(hw);

        let latency = self.latencies.effective_latency(core) as Micros;
        let sleep_time = request - latency;
        let bin = request_bin(request);
        self.stats.record_attempt(bin);

        hw.broadcast_enter(cpu);
        let parts = if mode.is_low_power() {
            if self.config.lp_cluster_gate_noncpu {
                ClusterPart::NONCPU
            } else {
                ClusterPart::empty()
            }
        } else {
            hw.rail_off(entry);
            self.config.fast_cluster_power_down
        };

        let outcome = match hw.enter_lp2_last(sleep_time, parts) {
            0 => Outcome::Completed,
            _ => Outcome::Interrupted {
                irq: hw.pending_interrupt(),
            },
        };

        hw.broadcast_exit(cpu);
        let exit = hw.now_us();
        if !mode.is_low_power() {
            hw.rail_on(exit);
        }

        drop(handoff);

        let episode = Episode {
            kind: GateKind::ClusterGate,
            core,
            requested_us: sleep_time + latency,
            elapsed_us: exit - entry,
            bin,
            outcome,
        };
        self.finish(state, &episode);
        drop(pm);

        Ok(episode)
    }

    /// Shared exit bookkeeping
    fn finish(&self, state: &mut IdleState, episode: &Episode) {
        self.stats.record_lp2_time(episode.core, episode.elapsed_us);

        match episode.outcome {
            Outcome::Completed => {
                let latency =
                    self.latencies
                        .update(episode.core, episode.requested_us, episode.elapsed_us);
                state.refresh(latency, self.config.power_off_time_us);
                self.stats.record_completion(episode.bin);

                log::debug!(
                    "cpuidle: {:?} request={} elapsed={} offset={} bin={} latency={}",
                    episode.core,
                    episode.requested_us,
                    episode.elapsed_us,
                    episode.elapsed_us - episode.requested_us,
                    episode.bin,
                    latency
                );
            },
            Outcome::Interrupted { irq } => {
                self.stats.record_wake_interrupt(irq);
            },
        }
    }
}
