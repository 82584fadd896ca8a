//! Round-robin policy (§4.I): every `Ready` thread gets an equal quantum;
//! priority plays no part in who runs next, only in tie-breaking within
//! [`crate::sync::mutex`]'s priority-inheritance waiter selection.

use crate::thread::{self, ThreadId, ThreadState, QUANTUM};

/// "Tail picks the successor in the ring if cur is still READY, otherwise
/// the head." `rotate` doesn't change this policy's answer — quantum
/// exhaustion and an explicit yield both mean "move on" — so it's unused
/// here; strict priority is the only policy that distinguishes the two.
pub fn pick_next(cur: Option<ThreadId>, _rotate: bool) -> Option<ThreadId> {
    match cur {
        Some(c) if thread::state(c) == ThreadState::Ready => super::ring_next_or_head(c),
        _ => super::ring_head(),
    }
}

/// Decrement the running thread's budget; refill and request a rotation
/// once it hits zero.
pub fn on_tick(cur: ThreadId) {
    let remaining = thread::budget(cur).saturating_sub(1);
    thread::set_budget(cur, remaining);
    if remaining == 0 {
        crate::arch::cpu_local::cpu_local()
            .set_need_resched(crate::arch::cpu_local::NeedResched::Normal);
        thread::set_budget(cur, QUANTUM);
    }
}
