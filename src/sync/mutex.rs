//! Priority-inheriting, non-recursive mutex.
//!
//! Grounded in `sync.cc`'s `mutex_lock`/`mutex_unlock`: ownership transfer
//! picks the highest-effective-priority waiter, and a mutex's priority-
//! inheritance contribution to its owner is recomputed on every waiter-set
//! or ownership change, not just lazily on lock.

use core::cell::Cell;

use crate::errors::{KernelResult, MutexError};
use crate::preempt::{preempt_disable, preempt_enable};
use crate::thread::{self, ThreadId};

/// Index into the kernel's mutex arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexId(pub usize);

#[cfg(feature = "lockdep")]
const LOCKDEP_MAX_DEPTH: usize = 16;

/// Maximum live mutexes. Generous for the lab scenarios in §8 (S1 and S2
/// each use at most two).
pub const MAX_MUTEXES: usize = 16;

const NEW_MUTEX: Mutex = Mutex::new(cfg!(feature = "priority-inheritance"));
static ARENA: [Mutex; MAX_MUTEXES] = [NEW_MUTEX; MAX_MUTEXES];
static NEXT_SLOT: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

/// Create a mutex, returning a handle into the kernel's mutex arena.
/// `pi_enabled` overrides the `priority-inheritance` feature default for
/// this instance (§6: PI is a build-time default, but individual mutexes
/// may still be created with it off, as S1 does before arming PI at
/// runtime via [`set_pi_enabled`]).
pub fn create(pi_enabled: bool) -> Option<MutexId> {
    let cur = NEXT_SLOT.fetch_add(1, core::sync::atomic::Ordering::AcqRel);
    if cur >= MAX_MUTEXES {
        return None;
    }
    let id = MutexId(cur);
    get(id).pi_enabled.set(pi_enabled);
    Some(id)
}

pub(crate) fn get(id: MutexId) -> &'static Mutex {
    &ARENA[id.0]
}

/// Current owner of mutex `id`, if any. Used by the lockdep cycle walk.
pub fn owner_of(id: MutexId) -> Option<ThreadId> {
    get(id).owner()
}

/// This mutex's contribution to its owner's effective priority: the
/// highest effective priority among its waiters, if PI is enabled on it
/// and it has any waiters. `None` otherwise.
pub fn pi_contribution(id: MutexId) -> Option<u8> {
    let m = get(id);
    if m.pi_enabled() {
        m.waiters_max_priority()
    } else {
        None
    }
}

pub fn lock(id: MutexId) {
    get(id).lock(id);
}

pub fn try_lock(id: MutexId) -> KernelResult<()> {
    get(id).try_lock(id)
}

pub fn unlock(id: MutexId) -> KernelResult<()> {
    get(id).unlock(id)
}

pub fn set_pi_enabled(id: MutexId, enabled: bool) {
    get(id).set_pi_enabled(enabled);
}

pub fn pi_enabled(id: MutexId) -> bool {
    get(id).pi_enabled()
}

pub struct Mutex {
    owner: Cell<Option<ThreadId>>,
    waiters: Cell<Option<ThreadId>>,
    pi_enabled: Cell<bool>,
}

unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new(pi_enabled: bool) -> Self {
        Self {
            owner: Cell::new(None),
            waiters: Cell::new(None),
            pi_enabled: Cell::new(pi_enabled),
        }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get()
    }

    pub fn set_pi_enabled(&self, enabled: bool) {
        self.pi_enabled.set(enabled);
        if let Some(owner) = self.owner.get() {
            thread::recompute_effective_priority(owner);
        }
    }

    pub fn pi_enabled(&self) -> bool {
        self.pi_enabled.get()
    }

    /// Highest effective priority among this mutex's current waiters, or
    /// `None` if it has none. Stable scan: the first maximum wins ties.
    pub(crate) fn waiters_max_priority(&self) -> Option<u8> {
        let mut best: Option<u8> = None;
        let mut cur = self.waiters.get();
        while let Some(id) = cur {
            let prio = thread::effective_priority(id);
            best = Some(match best {
                Some(b) if b >= prio => b,
                _ => prio,
            });
            cur = thread::wait_next(id);
        }
        best
    }

    fn push_waiter(&self, id: MutexId, me: ThreadId) {
        thread::set_wait_next(me, self.waiters.get());
        self.waiters.set(Some(me));
        thread::set_waiting_on(me, Some(id));
    }

    /// Pop the highest-effective-priority waiter (stable scan, first max
    /// wins), unlinking it from the waiter chain.
    fn pop_highest_waiter(&self) -> Option<ThreadId> {
        let mut best: Option<ThreadId> = None;
        let mut best_prio = 0u8;
        let mut cur = self.waiters.get();
        while let Some(id) = cur {
            let prio = thread::effective_priority(id);
            if best.is_none() || prio > best_prio {
                best = Some(id);
                best_prio = prio;
            }
            cur = thread::wait_next(id);
        }
        let best = best?;

        let mut prev: Option<ThreadId> = None;
        let mut cur = self.waiters.get();
        while let Some(id) = cur {
            let next = thread::wait_next(id);
            if id == best {
                match prev {
                    None => self.waiters.set(next),
                    Some(p) => thread::set_wait_next(p, next),
                }
                thread::set_wait_next(id, None);
                break;
            }
            prev = Some(id);
            cur = next;
        }
        Some(best)
    }

    /// Lock this mutex, blocking the calling thread if it is already held
    /// by someone else. Re-entry by the current owner is a no-op, matching
    /// `sync.cc`.
    pub fn lock(&self, id: MutexId) {
        loop {
            preempt_disable();
            let me = thread::current();
            match self.owner.get() {
                None => {
                    self.owner.set(Some(me));
                    thread::owned_mutex_add(me, id);
                    thread::set_waiting_on(me, None);
                    preempt_enable();
                    return;
                }
                Some(owner) if owner == me => {
                    preempt_enable();
                    return;
                }
                Some(owner) => {
                    #[cfg(feature = "lockdep")]
                    {
                        if would_deadlock(owner, me) {
                            crate::diag_println!("lockdep: cycle detected, halting");
                            crate::arch::halt();
                        }
                    }
                    self.push_waiter(id, me);
                    recompute_pi(id, self);
                    thread::sched_block_current();
                    preempt_enable();
                    // Woken by `unlock`; retry from the top.
                }
            }
        }
    }

    pub fn try_lock(&self, id: MutexId) -> KernelResult<()> {
        preempt_disable();
        let me = thread::current();
        let result = match self.owner.get() {
            None => {
                self.owner.set(Some(me));
                thread::owned_mutex_add(me, id);
                thread::set_waiting_on(me, None);
                Ok(())
            }
            Some(owner) if owner == me => Ok(()),
            Some(_) => Err(MutexError::WouldBlock.into()),
        };
        preempt_enable();
        result
    }

    pub fn unlock(&self, id: MutexId) -> KernelResult<()> {
        preempt_disable();
        let me = thread::current();
        if self.owner.get() != Some(me) {
            preempt_enable();
            return Err(MutexError::NotOwner.into());
        }
        thread::owned_mutex_remove(me, id);

        let new_owner = self.pop_highest_waiter();
        if let Some(waiter) = new_owner {
            self.owner.set(Some(waiter));
            thread::owned_mutex_add(waiter, id);
            thread::set_waiting_on(waiter, None);
            thread::sched_make_runnable(waiter);
            recompute_pi(id, self);
        } else {
            self.owner.set(None);
        }

        thread::recompute_effective_priority(me);

        if let Some(waiter) = new_owner {
            if thread::effective_priority(waiter) > thread::effective_priority(me) {
                thread::request_resched();
            }
        }
        preempt_enable();
        Ok(())
    }
}

fn recompute_pi(id: MutexId, mutex: &Mutex) {
    if let Some(owner) = mutex.owner.get() {
        let _ = id;
        thread::recompute_effective_priority(owner);
    }
}

/// Test-only stand-in for the contended branch of [`Mutex::lock`], minus
/// the retry loop. The host harness never performs a real context switch,
/// so looping back into `lock()` after parking would just spin forever
/// against an owner that can never change underneath it. Call with `waiter`
/// set as the current thread; mirrors `push_waiter` + `recompute_pi` +
/// `sched_block_current` exactly as `lock()` runs them.
#[cfg(test)]
pub(crate) fn test_block_on(id: MutexId, waiter: ThreadId) {
    let m = get(id);
    m.push_waiter(id, waiter);
    recompute_pi(id, m);
    thread::sched_block_current();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread;

    fn spawn(prio: u8) -> ThreadId {
        thread::create(|_| {}, 0, 4096, prio).unwrap()
    }

    #[test]
    fn lock_acquires_immediately_when_unowned() {
        let t = spawn(1);
        crate::arch::cpu_local::cpu_local().current_thread.set(Some(t));
        let m = create(false).unwrap();
        lock(m);
        assert_eq!(owner_of(m), Some(t));
        unlock(m).unwrap();
        assert_eq!(owner_of(m), None);
    }

    #[test]
    fn reentrant_lock_by_owner_is_a_noop() {
        let t = spawn(1);
        crate::arch::cpu_local::cpu_local().current_thread.set(Some(t));
        let m = create(false).unwrap();
        lock(m);
        lock(m); // must not deadlock against itself
        assert_eq!(owner_of(m), Some(t));
    }

    #[test]
    fn unlock_by_non_owner_is_rejected() {
        let owner = spawn(1);
        let other = spawn(1);
        crate::arch::cpu_local::cpu_local().current_thread.set(Some(owner));
        let m = create(false).unwrap();
        lock(m);
        crate::arch::cpu_local::cpu_local().current_thread.set(Some(other));
        let err = unlock(m).unwrap_err();
        assert!(matches!(err, crate::errors::KernelError::Mutex(MutexError::NotOwner)));
    }

    #[test]
    fn unlock_transfers_to_highest_priority_waiter_and_inherits() {
        let low = spawn(5);
        let high = spawn(20);
        let m = create(true).unwrap();

        crate::arch::cpu_local::cpu_local().current_thread.set(Some(low));
        lock(m);
        assert_eq!(thread::effective_priority(low), 5);

        crate::arch::cpu_local::cpu_local().current_thread.set(Some(high));
        test_block_on(m, high);
        // Priority inheritance: low's effective priority rises to high's.
        assert_eq!(thread::effective_priority(low), 20);

        crate::arch::cpu_local::cpu_local().current_thread.set(Some(low));
        unlock(m).unwrap();
        assert_eq!(owner_of(m), Some(high));
        assert_eq!(thread::waiting_on(high), None);
        assert_eq!(thread::effective_priority(low), 5);
    }

    #[test]
    fn pi_contribution_is_none_when_disabled_even_with_waiters() {
        let low = spawn(5);
        let high = spawn(20);
        let m = create(false).unwrap();

        crate::arch::cpu_local::cpu_local().current_thread.set(Some(low));
        lock(m);
        crate::arch::cpu_local::cpu_local().current_thread.set(Some(high));
        test_block_on(m, high);

        assert_eq!(pi_contribution(m), None);
        assert_eq!(thread::effective_priority(low), 5);
    }
}

#[cfg(feature = "lockdep")]
fn would_deadlock(start_owner: ThreadId, me: ThreadId) -> bool {
    let mut cur = Some(start_owner);
    for _ in 0..LOCKDEP_MAX_DEPTH {
        match cur {
            Some(t) if t == me => return true,
            Some(t) => match thread::waiting_on_owner(t) {
                Some(next_owner) => cur = Some(next_owner),
                None => return false,
            },
            None => return false,
        }
    }
    false
}
