//! Scriptable platform for unit tests.
//!
//! Registers are plain `Cell`s the test sets up front. Every call with a
//! side effect is appended to an event log; pure reads are not logged.
//! Sleeps advance the mock clock by the programmed budget plus
//! `exit_overhead`, or stop at `interrupt_at` if that comes first.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::config::ClusterPart;
use crate::error::AffinityError;
use crate::platform::{
    Clock, ClusterControl, IdlePredictor, InterruptDistributor, LocalTimerState, Micros,
    PmNotifier, PowerOps, RailControl, WakeTimer,
};
use crate::topology::{ClusterMode, CpuId, NR_CPUS};

/// Side effect observed by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DistDisable,
    DistEnable,
    CancelSecondaryTimers,
    RouteAffinity(CpuId),
    RestoreAffinity,
    PmEnter,
    PmExit,
    BroadcastEnter(CpuId),
    BroadcastExit(CpuId),
    RailOff,
    RailOn,
    Wfi,
    SuspendSecondary(CpuId),
    EnterLp2Last(Micros, ClusterPart),
    SetTrigger(Micros),
    SetLocalTimer(i64),
    SuspendLocalTimer,
    ResumeLocalTimer,
    MarkLp2(CpuId),
    ClearLp2(CpuId),
}

pub struct MockPlatform {
    pub now: Cell<Micros>,
    pub sleep_length: Cell<Micros>,
    pub nohz: Cell<bool>,
    pub cluster_mode: Cell<ClusterMode>,
    pub online: Cell<u32>,

    pub cpu_complex_status: Cell<u32>,
    pub powergate_status: Cell<u32>,
    pub rail_updating: Cell<bool>,

    pub dist_enabled: Cell<bool>,
    pub fail_restore: Cell<bool>,
    pub pending_irq: Cell<Option<u32>>,
    affinity: RefCell<[CpuId; NR_CPUS]>,
    saved_affinity: RefCell<Option<[CpuId; NR_CPUS]>>,

    pub local_timer: Cell<Option<LocalTimerState>>,
    pub lp2_ready: Cell<bool>,
    lp2_trigger: Cell<Micros>,
    lp2_remaining: Cell<Micros>,

    /// Interrupt arrives this long into a sleep
    pub interrupt_at: Cell<Option<Micros>>,
    /// Extra time the hardware takes to come back after a full sleep
    pub exit_overhead: Cell<Micros>,
    /// Fixed duration for the next last-CPU sleep, ignoring the budget
    pub elapsed_override: Cell<Option<Micros>>,

    events: RefCell<Vec<Event>>,
    sleep_hook: RefCell<Option<Box<dyn Fn()>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            sleep_length: Cell::new(50_000),
            nohz: Cell::new(true),
            cluster_mode: Cell::new(ClusterMode::Fast),
            online: Cell::new(1),
            cpu_complex_status: Cell::new(0xF),
            powergate_status: Cell::new(0),
            rail_updating: Cell::new(false),
            dist_enabled: Cell::new(true),
            fail_restore: Cell::new(false),
            pending_irq: Cell::new(None),
            affinity: RefCell::new([0, 1, 2, 3]),
            saved_affinity: RefCell::new(None),
            local_timer: Cell::new(None),
            lp2_ready: Cell::new(true),
            lp2_trigger: Cell::new(0),
            lp2_remaining: Cell::new(0),
            interrupt_at: Cell::new(None),
            exit_overhead: Cell::new(0),
            elapsed_override: Cell::new(None),
            events: RefCell::new(Vec::new()),
            sleep_hook: RefCell::new(None),
        }
    }

    /// Everything logged so far
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// How often `event` was logged
    pub fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    /// Current interrupt routing, one target CPU per peer
    pub fn affinity(&self) -> [CpuId; NR_CPUS] {
        *self.affinity.borrow()
    }

    /// Run `f` while the CPU is "asleep"
    pub fn on_sleep(&self, f: impl Fn() + 'static) {
        *self.sleep_hook.borrow_mut() = Some(Box::new(f));
    }

    fn log(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    /// Sleep for at most `budget`, returning whether it ran to the end
    fn sleep(&self, budget: Micros) -> bool {
        if let Some(hook) = self.sleep_hook.borrow().as_ref() {
            hook();
        }
        match self.interrupt_at.get() {
            Some(at) if at < budget => {
                self.now.set(self.now.get() + at);
                self.lp2_remaining.set(budget - at);
                false
            },
            _ => {
                self.now.set(self.now.get() + budget + self.exit_overhead.get());
                self.lp2_remaining.set(0);
                true
            },
        }
    }
}

impl fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPlatform")
            .field("now", &self.now.get())
            .field("events", &self.events.borrow())
            .finish_non_exhaustive()
    }
}

impl IdlePredictor for MockPlatform {
    fn sleep_length_us(&self, _cpu: CpuId) -> Micros {
        self.sleep_length.get()
    }

    fn nohz_active(&self, _cpu: CpuId) -> bool {
        self.nohz.get()
    }
}

impl ClusterControl for MockPlatform {
    fn cluster_mode(&self) -> ClusterMode {
        self.cluster_mode.get()
    }

    fn online_cpus(&self) -> u32 {
        self.online.get()
    }

    fn set_cpu_in_lp2(&self, cpu: CpuId) {
        self.log(Event::MarkLp2(cpu));
    }

    fn clear_cpu_in_lp2(&self, cpu: CpuId) {
        self.log(Event::ClearLp2(cpu));
    }
}

impl RailControl for MockPlatform {
    fn cpu_complex_status(&self) -> u32 {
        self.cpu_complex_status.get()
    }

    fn powergate_status(&self) -> u32 {
        self.powergate_status.get()
    }

    fn rail_updating(&self) -> bool {
        self.rail_updating.get()
    }

    fn rail_off(&self, _now: Micros) {
        self.log(Event::RailOff);
    }

    fn rail_on(&self, _now: Micros) {
        self.log(Event::RailOn);
    }
}

impl InterruptDistributor for MockPlatform {
    fn dist_disable(&self) {
        self.dist_enabled.set(false);
        self.log(Event::DistDisable);
    }

    fn dist_enable(&self) {
        self.dist_enabled.set(true);
        self.log(Event::DistEnable);
    }

    fn save_and_route_affinity(&self, target: CpuId) {
        let current = self.affinity();
        *self.saved_affinity.borrow_mut() = Some(current);
        *self.affinity.borrow_mut() = [target; NR_CPUS];
        self.log(Event::RouteAffinity(target));
    }

    fn restore_affinity(&self) -> Result<(), AffinityError> {
        self.log(Event::RestoreAffinity);
        if self.fail_restore.get() {
            return Err(AffinityError { irq: 32 });
        }
        if let Some(saved) = self.saved_affinity.borrow_mut().take() {
            *self.affinity.borrow_mut() = saved;
        }
        Ok(())
    }

    fn pending_interrupt(&self) -> Option<u32> {
        self.pending_irq.get()
    }

    fn irq_name(&self, irq: u32) -> Option<&'static str> {
        match irq {
            32 => Some("timer0"),
            77 => Some("sdhci"),
            _ => None,
        }
    }
}

impl WakeTimer for MockPlatform {
    fn local_timer(&self) -> Option<LocalTimerState> {
        self.local_timer.get()
    }

    fn set_local_timer_value(&self, tval: i64) {
        if let Some(mut timer) = self.local_timer.get() {
            timer.tval = tval;
            self.local_timer.set(Some(timer));
        }
        self.log(Event::SetLocalTimer(tval));
    }

    fn suspend_local_timer(&self) {
        self.log(Event::SuspendLocalTimer);
    }

    fn resume_local_timer(&self) {
        self.log(Event::ResumeLocalTimer);
    }

    fn lp2_timer_ready(&self, _cpu: CpuId) -> bool {
        self.lp2_ready.get()
    }

    fn set_lp2_trigger(&self, sleep_us: Micros) {
        self.lp2_trigger.set(sleep_us);
        self.log(Event::SetTrigger(sleep_us));
    }

    fn lp2_timer_remaining(&self) -> Micros {
        self.lp2_remaining.get()
    }

    fn cancel_secondary_lp2_timers(&self) {
        self.log(Event::CancelSecondaryTimers);
    }
}

impl PmNotifier for MockPlatform {
    fn cpu_pm_enter(&self) {
        self.log(Event::PmEnter);
    }

    fn cpu_pm_exit(&self) {
        self.log(Event::PmExit);
    }

    fn broadcast_enter(&self, cpu: CpuId) {
        self.log(Event::BroadcastEnter(cpu));
    }

    fn broadcast_exit(&self, cpu: CpuId) {
        self.log(Event::BroadcastExit(cpu));
    }
}

impl PowerOps for MockPlatform {
    fn wfi(&self) {
        self.log(Event::Wfi);
    }

    fn suspend_secondary(&self, cpu: CpuId) {
        self.log(Event::SuspendSecondary(cpu));

        let trigger = self.lp2_trigger.get();
        let timer = self.local_timer.get();
        let budget = if trigger > 0 {
            trigger
        } else {
            timer.map_or(self.sleep_length.get(), |t| t.remaining_us())
        };

        let completed = self.sleep(budget);

        if let Some(mut t) = timer {
            t.tval = if completed {
                0
            } else {
                self.lp2_remaining.get() * t.ticks_per_us()
            };
            self.local_timer.set(Some(t));
        }
    }

    fn enter_lp2_last(&self, sleep_us: Micros, parts: ClusterPart) -> i32 {
        self.log(Event::EnterLp2Last(sleep_us, parts));

        if let Some(elapsed) = self.elapsed_override.take() {
            if let Some(hook) = self.sleep_hook.borrow().as_ref() {
                hook();
            }
            self.now.set(self.now.get() + elapsed);
            return 0;
        }

        if self.sleep(sleep_us) {
            0
        } else {
            1
        }
    }
}

impl Clock for MockPlatform {
    fn now_us(&self) -> Micros {
        self.now.get()
    }
}
