//! The runqueue and the two interchangeable scheduling policies.
//!
//! The ring (§3 "Runqueue") holds every `Ready` thread, the currently
//! running one included — it is only ever unlinked when a thread blocks
//! (`dequeue`, called from `thread::sched_block_current`) and relinked
//! when it's made runnable again (`enqueue`). Policies never touch the
//! ring's head/tail pointers directly; they only read `ThreadId`s back out
//! through [`ring_head`]/[`ring_next_or_head`] and decide who runs next.

use crate::arch::cpu_local::{cpu_local, NeedResched};
use crate::sync::Spinlock;
use crate::thread::{self, ThreadId, ThreadState};

#[cfg(feature = "sched-prio")]
mod prio;
#[cfg(not(feature = "sched-prio"))]
mod rr;

struct RunqueueState {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
}

static RUNQ: Spinlock<RunqueueState> = Spinlock::new(RunqueueState {
    head: None,
    tail: None,
});

/// Append `id` to the tail of the ring. Used both for brand-new threads
/// (`thread::sched_add`) and to relink a thread that was just made
/// runnable again (`thread::sched_make_runnable`).
pub fn enqueue(id: ThreadId) {
    let mut rq = RUNQ.lock_irqsave();
    thread::set_ring_next(id, None);
    match rq.tail {
        None => {
            rq.head = Some(id);
            rq.tail = Some(id);
        }
        Some(t) => {
            thread::set_ring_next(t, Some(id));
            rq.tail = Some(id);
        }
    }
}

/// Unlink `id` from the ring. Called once, right before a thread's state
/// flips to `Blocked` (§3: "A BLOCKED thread is never on the ring").
pub fn dequeue(id: ThreadId) {
    let mut rq = RUNQ.lock_irqsave();
    if rq.head == Some(id) {
        let next = thread::ring_next(id);
        rq.head = next;
        if rq.tail == Some(id) {
            rq.tail = None;
        }
        thread::set_ring_next(id, None);
        return;
    }
    let mut prev = rq.head;
    while let Some(p) = prev {
        let next = thread::ring_next(p);
        if next == Some(id) {
            let after = thread::ring_next(id);
            thread::set_ring_next(p, after);
            if rq.tail == Some(id) {
                rq.tail = Some(p);
            }
            thread::set_ring_next(id, None);
            return;
        }
        prev = next;
    }
}

pub(crate) fn ring_head() -> Option<ThreadId> {
    RUNQ.lock_irqsave().head
}

/// `id`'s successor in the logical ring, wrapping to the head if `id` is
/// the current tail. The ring is stored as a plain singly-linked list
/// (`tail.ring_next == None`), not a physically closed cycle, so wrapping
/// is computed here rather than maintained on every insert/remove.
pub(crate) fn ring_next_or_head(id: ThreadId) -> Option<ThreadId> {
    thread::ring_next(id).or_else(ring_head)
}

/// Visit every thread currently on the ring exactly once.
pub(crate) fn for_each_ready<F: FnMut(ThreadId)>(mut f: F) {
    let start = match ring_head() {
        Some(h) => h,
        None => return,
    };
    let mut cur = Some(start);
    let mut first = true;
    while let Some(id) = cur {
        if !first && id == start {
            break;
        }
        first = false;
        f(id);
        cur = ring_next_or_head(id);
    }
}

#[cfg(feature = "sched-prio")]
fn policy_pick_next(cur: Option<ThreadId>, rotate: bool) -> Option<ThreadId> {
    prio::pick_next(cur, rotate)
}

#[cfg(not(feature = "sched-prio"))]
fn policy_pick_next(cur: Option<ThreadId>, rotate: bool) -> Option<ThreadId> {
    rr::pick_next(cur, rotate)
}

#[cfg(feature = "sched-prio")]
fn policy_on_tick(cur: ThreadId) {
    prio::on_tick(cur)
}

#[cfg(not(feature = "sched-prio"))]
fn policy_on_tick(cur: ThreadId) {
    rr::on_tick(cur)
}

/// Pick the next thread to run per the active policy. `rotate` distinguishes
/// time-slice exhaustion / explicit yield (strict priority rotates among
/// equals) from a plain "something better may be ready" check.
pub fn pick_next(cur: Option<ThreadId>, rotate: bool) -> Option<ThreadId> {
    policy_pick_next(cur, rotate)
}

/// Cooperative yield always rotates one step, regardless of policy.
pub fn pick_for_yield(cur: ThreadId) -> Option<ThreadId> {
    policy_pick_next(Some(cur), true)
}

/// Timer tick handler (§4.I, both policies): verify the running thread's
/// stack guard before any scheduling decision, then delegate budget/
/// priority bookkeeping to the active policy.
pub fn sched_on_tick() {
    let cpu = cpu_local();
    let cur = match cpu.current_thread.get() {
        Some(c) => c,
        None => return,
    };
    if !thread::guard_ok(cur) {
        crate::diag_println!("stack overflow detected on thread {:?}, halting", cur);
        crate::arch::halt();
    }
    policy_on_tick(cur);
}

/// Run after the IRQ handler proper (via the `preempt_return` thunk) or
/// from `preempt_enable` once the nesting count drops to zero. Performs
/// the actual context switch if one is still owed.
pub fn sched_resched_from_irq_tail() {
    let cpu = cpu_local();
    if cpu.preempt_cnt.load(core::sync::atomic::Ordering::Relaxed) != 0 {
        // Re-entrant: leave need_resched set for the outer section to see.
        return;
    }
    let cur = match cpu.current_thread.get() {
        Some(c) => c,
        None => return,
    };
    let kind = cpu.take_need_resched();
    if kind == NeedResched::None {
        return;
    }
    let rotate = kind == NeedResched::Rotate;
    if let Some(next) = pick_next(Some(cur), rotate) {
        if next != cur {
            thread::do_switch(cur, next);
        }
    }
}

/// Pick the first thread and jump to it. Never returns; a genuine return
/// (the assembly "fell through") is a fatal programming error (§7).
pub fn sched_start() -> ! {
    let first = match pick_next(None, false) {
        Some(t) => t,
        None => {
            crate::diag_println!("sched_start: no runnable thread, halting");
            crate::arch::halt();
        }
    };
    cpu_local().current_thread.set(Some(first));
    thread::enter_first(first);
}
