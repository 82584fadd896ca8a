//! Preempt-disable nesting counter.
//!
//! Raising the count tells the IRQ tail and `preempt_enable` to defer any
//! pending reschedule until the last nested section exits. A compiler
//! fence brackets both sides so the optimizer cannot hoist memory accesses
//! across the disable/enable boundary, even though the counter itself is
//! only ever touched from this one hart.

use core::sync::atomic::{compiler_fence, Ordering};

use crate::arch::cpu_local::cpu_local;

pub fn preempt_disable() {
    cpu_local().preempt_cnt.fetch_add(1, Ordering::Relaxed);
    compiler_fence(Ordering::SeqCst);
}

pub fn preempt_enable() {
    compiler_fence(Ordering::SeqCst);
    let cpu = cpu_local();
    if cpu.preempt_cnt.load(Ordering::Relaxed) == 0 {
        return;
    }
    let prev = cpu.preempt_cnt.fetch_sub(1, Ordering::Relaxed);
    if prev == 1 && cpu.needs_resched() && cpu.irq_depth.load(Ordering::Relaxed) == 0 {
        crate::sched::sched_resched_from_irq_tail();
    }
}

/// IRQ-return thunk target. When an IRQ interrupted code running with
/// preemption disabled, the frame's link address is rewritten to this
/// function instead of the original interrupted PC; by the time it runs,
/// the disable has been lifted and a reschedule can happen right away
/// without another trip through interrupt context.
pub extern "C" fn preempt_return() {
    let cpu = cpu_local();
    if cpu.preempt_cnt.load(Ordering::Relaxed) == 0 && cpu.needs_resched() {
        crate::sched::sched_resched_from_irq_tail();
    }
}

/// RAII guard mirroring `preempt_disable`/`preempt_enable` for call sites
/// that want scope-based release (used by `sync::spinlock`).
pub struct PreemptGuard(());

impl PreemptGuard {
    pub fn new() -> Self {
        preempt_disable();
        Self(())
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        preempt_enable();
    }
}
