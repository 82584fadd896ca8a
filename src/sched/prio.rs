//! Strict-priority policy (§4.I): the highest effective-priority `Ready`
//! thread always runs. Ties are broken by keeping the current thread
//! running unless a rotation was requested (quantum exhaustion at equal
//! priority, or an explicit yield), in which case the tie goes to whoever
//! comes next after `cur` on the ring.

use crate::thread::{self, ThreadId, ThreadState, QUANTUM};

/// Highest-priority thread on the ring, scanning from `start` (inclusive)
/// once around. Ties go to whichever is found first, i.e. closest to
/// `start` going forward.
fn scan_best(start: Option<ThreadId>) -> Option<ThreadId> {
    let start = start?;
    let mut best: Option<ThreadId> = None;
    let mut best_prio: i16 = -1;
    let mut cur = Some(start);
    let mut first = true;
    while let Some(id) = cur {
        if !first && id == start {
            break;
        }
        first = false;
        let p = thread::effective_priority(id) as i16;
        if p > best_prio {
            best = Some(id);
            best_prio = p;
        }
        cur = super::ring_next_or_head(id);
    }
    best
}

pub fn pick_next(cur: Option<ThreadId>, rotate: bool) -> Option<ThreadId> {
    let start = if rotate {
        cur.and_then(super::ring_next_or_head).or_else(super::ring_head)
    } else {
        super::ring_head()
    };
    let best = scan_best(start)?;

    if !rotate {
        if let Some(c) = cur {
            if thread::state(c) == ThreadState::Ready
                && thread::effective_priority(c) == thread::effective_priority(best)
            {
                return Some(c);
            }
        }
    }
    Some(best)
}

/// Request an immediate (non-rotating) reschedule if some other ready
/// thread now outranks `cur`; otherwise fall back to round-robin-style
/// budget exhaustion among equals.
pub fn on_tick(cur: ThreadId) {
    let cur_prio = thread::effective_priority(cur);
    let mut better_ready = false;
    super::for_each_ready(|id| {
        if id != cur && thread::effective_priority(id) > cur_prio {
            better_ready = true;
        }
    });
    if better_ready {
        crate::arch::cpu_local::cpu_local()
            .set_need_resched(crate::arch::cpu_local::NeedResched::Normal);
        return;
    }

    let remaining = thread::budget(cur).saturating_sub(1);
    thread::set_budget(cur, remaining);
    if remaining == 0 {
        crate::arch::cpu_local::cpu_local()
            .set_need_resched(crate::arch::cpu_local::NeedResched::Rotate);
        thread::set_budget(cur, QUANTUM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched;

    #[test]
    fn highest_priority_wins_over_fifo_order() {
        let low = thread::create(|_| {}, 0, 4096, 1).unwrap();
        let high = thread::create(|_| {}, 0, 4096, 10).unwrap();
        sched::enqueue(low);
        sched::enqueue(high);
        assert_eq!(pick_next(None, false), Some(high));
    }

    #[test]
    fn equal_priority_keeps_current_without_rotation() {
        let a = thread::create(|_| {}, 0, 4096, 5).unwrap();
        let b = thread::create(|_| {}, 0, 4096, 5).unwrap();
        sched::enqueue(a);
        sched::enqueue(b);
        assert_eq!(pick_next(Some(a), false), Some(a));
    }

    #[test]
    fn rotation_moves_to_successor_among_equals() {
        let a = thread::create(|_| {}, 0, 4096, 5).unwrap();
        let b = thread::create(|_| {}, 0, 4096, 5).unwrap();
        sched::enqueue(a);
        sched::enqueue(b);
        assert_eq!(pick_next(Some(a), true), Some(b));
    }

    #[test]
    fn higher_priority_preempts_even_without_rotation() {
        let low = thread::create(|_| {}, 0, 4096, 1).unwrap();
        let high = thread::create(|_| {}, 0, 4096, 20).unwrap();
        sched::enqueue(low);
        sched::enqueue(high);
        assert_eq!(pick_next(Some(low), false), Some(high));
    }
}
