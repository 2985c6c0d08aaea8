//! # LP2 Diagnostics Report
//!
//! Renders the live counters as a fixed-width text table:
//!
//! ```text
//!                          cpu0     cpu1     cpu2     cpu3    cpulp
//! -----------------------------------------------------------------
//! cpu ready:                  …
//! tear down:                  …
//! lp2:                        …
//! lp2 completed:              …   (%)
//!
//! cpu ready time:             … ms
//! lp2 time:                   … ms
//! lp2 %:                      …
//!
//! duration histogram (issued / completed / %)
//! early-wake interrupts (count / delta since previous report)
//! ```
//!
//! Each report remembers the per-interrupt counts it printed so the next
//! one can show what changed in between.

use core::fmt::{self, Write};

use spin::Mutex;

use crate::platform::InterruptDistributor;
use crate::stats::{percent, IdleStats, NR_BINS, NR_IRQS};
use crate::topology::{CoreIndex, NR_SLOTS};

const RULE: &str = "-----------------------------------------------------------------";

/// Interrupt counts printed by the previous report
#[derive(Debug)]
pub struct ReportState {
    last_int_count: Mutex<[u32; NR_IRQS]>,
}

impl ReportState {
    /// Create state for a first report
    pub const fn new() -> Self {
        Self {
            last_int_count: Mutex::new([0; NR_IRQS]),
        }
    }
}

impl Default for ReportState {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_label(core: CoreIndex) -> &'static str {
    match core {
        CoreIndex::Cpu(0) => "cpu0",
        CoreIndex::Cpu(1) => "cpu1",
        CoreIndex::Cpu(2) => "cpu2",
        CoreIndex::Cpu(3) => "cpu3",
        CoreIndex::Cpu(_) => "cpu?",
        CoreIndex::LowPower => "cpulp",
    }
}

fn per_slot_row<W: Write>(
    out: &mut W,
    label: &str,
    values: &[u64; NR_SLOTS],
    suffix: &str,
) -> fmt::Result {
    write!(out, "{:<24}", label)?;
    for v in values {
        write!(out, "{:>8}{}", v, suffix)?;
    }
    writeln!(out)
}

/// Write the full report for `stats` into `out`.
///
/// `names` supplies handler names for the interrupt table. Holding the
/// report lock serialises concurrent readers so deltas are not split
/// between them.
pub fn write_report<W, D>(
    stats: &IdleStats,
    state: &ReportState,
    names: &D,
    out: &mut W,
) -> fmt::Result
where
    W: Write,
    D: InterruptDistributor + ?Sized,
{
    let snap = stats.snapshot();

    write!(out, "{:<24}", "")?;
    for core in CoreIndex::all() {
        write!(out, "{:>8}", slot_label(core))?;
    }
    writeln!(out)?;
    writeln!(out, "{}", RULE)?;

    let widen = |src: &[u32; NR_SLOTS]| {
        let mut wide = [0u64; NR_SLOTS];
        for (w, s) in wide.iter_mut().zip(src) {
            *w = u64::from(*s);
        }
        wide
    };
    let to_ms = |src: &[u64; NR_SLOTS]| {
        let mut ms = [0u64; NR_SLOTS];
        for (m, s) in ms.iter_mut().zip(src) {
            *m = *s / 1000;
        }
        ms
    };

    per_slot_row(out, "cpu ready:", &widen(&snap.cpu_ready_count), "")?;
    per_slot_row(out, "tear down:", &widen(&snap.tear_down_count), "")?;
    writeln!(out, "{:<24}{:>8}", "lp2:", snap.lp2_count)?;
    writeln!(
        out,
        "{:<24}{:>8} {:>7}%",
        "lp2 completed:",
        snap.lp2_completed_count,
        snap.completion_percent()
    )?;
    writeln!(out)?;

    per_slot_row(out, "cpu ready time:", &to_ms(&snap.cpu_wants_lp2_time), " ms")?;
    per_slot_row(out, "lp2 time:", &to_ms(&snap.in_lp2_time), " ms")?;
    write!(out, "{:<24}", "lp2 %:")?;
    for core in CoreIndex::all() {
        write!(out, "{:>7}%", snap.residency_percent(core))?;
    }
    writeln!(out)?;
    writeln!(out)?;

    writeln!(out, "{:<24}{:>8} {:>8} {:>8}", "", "lp2", "comp", "%")?;
    writeln!(out, "{}", RULE)?;
    for bin in 0..NR_BINS {
        let issued = snap.lp2_count_bin[bin];
        if issued == 0 {
            continue;
        }
        let completed = snap.lp2_completed_count_bin[bin];
        let low = if bin == 0 { 0u64 } else { 1u64 << (bin - 1) };
        let high = 1u64 << bin;
        writeln!(
            out,
            "{:>6} - {:>6} ms: {:>8} {:>8} {:>7}%",
            low,
            high,
            issued,
            completed,
            percent(u64::from(completed), u64::from(issued))
        )?;
    }
    writeln!(out)?;

    writeln!(out, "{:>3} {:>20} {:>6} {:>10}", "int", "name", "count", "last count")?;
    writeln!(out, "{}", RULE)?;

    let mut last = state.last_int_count.lock();
    for (irq, count) in stats.interrupt_attributions() {
        let prev = &mut last[irq as usize];
        let name = names.irq_name(irq).unwrap_or("");
        writeln!(
            out,
            "{:>3} {:>20} {:>6} {:>10}",
            irq,
            name,
            count,
            count.wrapping_sub(*prev)
        )?;
        *prev = count;
    }
    writeln!(
        out,
        "{:>3} {:>20} {:>6}",
        "?",
        "unknown",
        stats.unknown_interrupt_count()
    )
}
