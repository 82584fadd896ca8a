//! Single per-CPU control block.
//!
//! This crate targets one hart, so there is exactly one [`CpuLocal`]
//! instance, anchored at a fixed static and (on real hardware) mirrored
//! into `TPIDR_EL1` so the vector stub can reach it without touching the
//! heap or any lock. Layout is cache-line aligned: the IRQ entry stub
//! writes `irq_stack_top` before anything else, so it has to be at a fixed,
//! cheap-to-compute offset.
#![allow(clippy::declare_interior_mutable_const)]

use core::cell::Cell;
use core::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};

use crate::thread::ThreadId;

/// Tri-state resched tag set by the scheduler and consumed by the IRQ tail.
///
/// `Normal` means "reschedule if something better is ready"; `Rotate` means
/// "the current thread's quantum is spent, rotate it to the back even among
/// equal-priority peers" (only the strict-priority policy distinguishes the
/// two — round-robin treats both the same way).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NeedResched {
    None = 0,
    Normal = 1,
    Rotate = 2,
}

/// Per-CPU control block. One instance exists for the lifetime of the
/// kernel; see [`cpu_local`].
#[repr(C, align(64))]
pub struct CpuLocal {
    /// Top of the per-CPU IRQ stack; read by the vector entry stub before
    /// any Rust code runs, so it must stay the first field.
    pub irq_stack_top: AtomicUsize,
    /// Thread currently on core, or `None` before the first thread starts.
    pub current_thread: Cell<Option<ThreadId>>,
    /// Preempt-disable nesting depth; see `crate::preempt`.
    pub preempt_cnt: AtomicU64,
    /// Set by the scheduler when a higher-priority thread becomes runnable
    /// while preemption is disabled; consumed by `preempt_enable`/the IRQ
    /// tail once the count drops back to zero.
    pub need_resched: AtomicI32,
    /// Ticks observed since boot.
    pub ticks: AtomicU64,
    /// Nested IRQ depth; `sched_resched_from_irq_tail` only runs at depth 0.
    pub irq_depth: AtomicU64,
}

impl CpuLocal {
    const fn new() -> Self {
        Self {
            irq_stack_top: AtomicUsize::new(0),
            current_thread: Cell::new(None),
            preempt_cnt: AtomicU64::new(0),
            need_resched: AtomicI32::new(NeedResched::None as i32),
            ticks: AtomicU64::new(0),
            irq_depth: AtomicU64::new(0),
        }
    }

    /// Request a reschedule, upgrading `None` to the given kind. `Rotate`
    /// always wins over `Normal` — once the current thread's quantum is
    /// known to be spent, a later `Normal` request (e.g. from a nested
    /// wakeup) must not downgrade it.
    pub fn set_need_resched(&self, kind: NeedResched) {
        if kind == NeedResched::Rotate {
            self.need_resched
                .store(NeedResched::Rotate as i32, Ordering::Release);
            return;
        }
        let _ = self.need_resched.compare_exchange(
            NeedResched::None as i32,
            kind as i32,
            Ordering::Release,
            Ordering::Relaxed,
        );
    }

    pub fn take_need_resched(&self) -> NeedResched {
        match self
            .need_resched
            .swap(NeedResched::None as i32, Ordering::AcqRel)
        {
            x if x == NeedResched::Rotate as i32 => NeedResched::Rotate,
            x if x == NeedResched::Normal as i32 => NeedResched::Normal,
            _ => NeedResched::None,
        }
    }

    pub fn clear_need_resched(&self) {
        self.need_resched
            .store(NeedResched::None as i32, Ordering::Release);
    }

    pub fn needs_resched(&self) -> bool {
        self.need_resched.load(Ordering::Acquire) != NeedResched::None as i32
    }
}

// `Cell<Option<ThreadId>>` is not `Sync`; this block is only ever touched
// from the one hart it belongs to, with interrupts masked around any access
// that must not race the vector stub.
unsafe impl Sync for CpuLocal {}

static CPU0: CpuLocal = CpuLocal::new();

/// Return the control block for this hart.
///
/// Single-hart target: always returns [`CPU0`]. A multi-core port would
/// read `TPIDR_EL1` here instead.
#[inline(always)]
pub fn cpu_local() -> &'static CpuLocal {
    &CPU0
}
