//! Shared scaffolding for the crate-level test trees.
//!
//! The host harness (`std-shim`) never performs a real architectural
//! context switch (`arch::aarch64_stub::Aarch64Arch::context_switch` is a
//! no-op) — there is only one real call stack for the whole test binary.
//! `thread::do_switch`/`enter_first` still flip
//! `arch::cpu_local::CpuLocal::current_thread` as a side effect, which is
//! enough for a contended `sync::mutex::lock` call to resolve correctly on
//! its own (the retry loop re-reads `thread::current()` and finds whoever
//! the scheduler picked), but relying on *which* thread ends up current
//! after such a call is fragile and policy-dependent. Tests that need a
//! specific thread "current" after a blocking call set it explicitly with
//! [`set_current`] rather than trusting that side effect.
//!
//! The thread arena, runqueue, mutex/semaphore/DMA arenas are all
//! process-wide statics shared by every test in the binary. [`CpuGuard`]
//! and [`RingGuard`] exist so a test that pokes at per-CPU state or leaves
//! threads on the runqueue cleans up after itself even if it panics
//! partway through (`#[should_panic]` tests unwind through both).

use core::sync::atomic::Ordering;

use alloc::vec::Vec;

use crate::arch::cpu_local::cpu_local;
use crate::thread::{self, ThreadId};

fn noop_entry(_arg: usize) {}

/// Create a thread with a throwaway entry point and a generous stack, for
/// tests that only care about scheduling/locking bookkeeping and never
/// actually run the thread's code.
pub fn spawn(base_prio: u8) -> ThreadId {
    thread::create(noop_entry, 0, 4096, base_prio).expect("thread arena exhausted in test")
}

/// Force "current thread" on this (single, host) hart, bypassing the
/// scheduler. Tests use this to narrate "thread X is now running" the way
/// a real context switch would establish it.
pub fn set_current(id: ThreadId) {
    cpu_local().current_thread.set(Some(id));
}

/// Clear any pending reschedule request left over from a previous test.
pub fn reset_resched() {
    cpu_local().clear_need_resched();
}

/// Snapshots the per-CPU block on construction and restores it on drop,
/// so a test's `current_thread`/`preempt_cnt`/`need_resched`/`irq_depth`
/// pokes never leak into the next test — including when the test panics.
pub struct CpuGuard {
    current: Option<ThreadId>,
    preempt_cnt: u64,
    need_resched: i32,
    irq_depth: u64,
}

impl CpuGuard {
    pub fn new() -> Self {
        let cpu = cpu_local();
        Self {
            current: cpu.current_thread.get(),
            preempt_cnt: cpu.preempt_cnt.load(Ordering::Relaxed),
            need_resched: cpu.need_resched.load(Ordering::Relaxed),
            irq_depth: cpu.irq_depth.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CpuGuard {
    fn drop(&mut self) {
        let cpu = cpu_local();
        cpu.current_thread.set(self.current);
        cpu.preempt_cnt.store(self.preempt_cnt, Ordering::Relaxed);
        cpu.need_resched.store(self.need_resched, Ordering::Relaxed);
        cpu.irq_depth.store(self.irq_depth, Ordering::Relaxed);
    }
}

/// Tracks threads a test has enqueued onto the runqueue and dequeues them
/// all on drop, so leftover ring members from one test never skew
/// `pick_next`'s ring walk in the next one.
#[derive(Default)]
pub struct RingGuard(Vec<ThreadId>);

impl RingGuard {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Record `id` for cleanup and return it, so call sites can wrap
    /// `ring.track(thread::create(...))` inline.
    pub fn track(&mut self, id: ThreadId) -> ThreadId {
        self.0.push(id);
        id
    }
}

impl Drop for RingGuard {
    fn drop(&mut self) {
        for &id in &self.0 {
            crate::sched::dequeue(id);
        }
    }
}

#[cfg(feature = "std-shim")]
static DIAG_SINK: crate::arch::uart::std_shim::BufferSink =
    crate::arch::uart::std_shim::BufferSink::new();

/// Install the capture sink (idempotent) and discard anything buffered so
/// far, so the next fatal-path trigger starts from an empty log.
#[cfg(feature = "std-shim")]
pub fn reset_diag() {
    crate::arch::uart::install(&DIAG_SINK);
    let _ = DIAG_SINK.take();
}

/// Drain everything written to the diagnostic sink since the last
/// [`reset_diag`]/[`take_diag`] call.
#[cfg(feature = "std-shim")]
pub fn take_diag() -> std::string::String {
    DIAG_SINK.take()
}

/// Run `f`, suppressing the default panic-hook printout, and report whether
/// it unwound. Used to observe `arch::halt()`'s fatal paths (§7: stack-guard
/// mismatch, lockdep cycle) the way the doc comment on `arch::halt`
/// describes, without the expected panic spamming the test's stderr.
#[cfg(feature = "std-shim")]
pub fn halts(f: impl FnOnce() + std::panic::UnwindSafe) -> bool {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(std::boxed::Box::new(|_| {}));
    let result = std::panic::catch_unwind(f);
    std::panic::set_hook(prev_hook);
    result.is_err()
}
