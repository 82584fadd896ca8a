//! End-to-end lab scenarios, driven procedurally instead of by letting the
//! scheduler actually run multiple threads — the host harness never
//! performs a real context switch (see `tests::helpers`'s module doc), so
//! these tests narrate a specific interleaving by hand: `helpers::set_current`
//! picks who's "running", and `sync::mutex::test_block_on` stands in for the
//! moment a real thread would park (see that function's doc comment for why
//! calling the production `mutex::lock` directly would hang the test
//! process instead of returning).
//!
//! S4 (IRQ reentrancy: an IRQ landing mid-critical-section must never
//! reenter a lock its own interrupted context already holds) has no host
//! equivalent — there's only one real call stack here, nothing can
//! interrupt it. That property is instead covered by the ordering
//! assertions in `sync::spinlock`'s own unit tests and by this crate's
//! `lock_irqsave` always masking IRQs before taking the raw word.

use crate::sync::{dma, mutex};
use crate::tests::helpers::{self, CpuGuard};
use crate::thread::{self, ThreadState};
use crate::{mmu, sched};

/// S1: priority inversion and its recovery through priority inheritance.
/// L (low) holds a mutex; H (high) blocks on it. With PI off, L keeps
/// running at its own priority while H waits — the inversion. Enabling PI
/// lifts L to H's priority so L can finish and hand the mutex to H without
/// a mid-priority thread being able to starve it.
#[test]
fn s1_priority_inversion_recovers_once_pi_is_armed() {
    let _cpu = CpuGuard::new();
    let low = helpers::spawn(5);
    let high = helpers::spawn(20);

    let shared = mutex::create(false).unwrap();

    helpers::set_current(low);
    mutex::lock(shared);
    assert_eq!(mutex::get(shared).owner(), Some(low));

    helpers::set_current(high);
    mutex::test_block_on(shared, high);
    assert_eq!(thread::state(high), ThreadState::Blocked);
    assert_eq!(thread::waiting_on(high), Some(shared));

    // PI disabled: L is still only running at its own priority, even
    // though a higher-priority thread is waiting on it.
    assert_eq!(thread::effective_priority(low), 5);

    mutex::set_pi_enabled(shared, true);
    assert_eq!(thread::effective_priority(low), 20, "L should inherit H's priority");

    helpers::set_current(low);
    mutex::unlock(shared).unwrap();
    assert_eq!(mutex::get(shared).owner(), Some(high));
    assert_eq!(thread::state(high), ThreadState::Ready);
    assert_eq!(thread::waiting_on(high), None);
    assert_eq!(thread::effective_priority(low), 5, "L's priority boost is released with the mutex");

    helpers::set_current(high);
    mutex::unlock(shared).unwrap();
    assert_eq!(mutex::get(shared).owner(), None);

    crate::sched::dequeue(low);
    crate::sched::dequeue(high);
}

/// S2: two mutexes acquired in opposite order by two threads. With lockdep
/// on, the second contended `lock()` call detects the cycle and halts
/// instead of joining the waiter chain. With it off, both threads simply
/// end up parked on each other forever — a real deadlock, silently.
#[test]
#[cfg(feature = "lockdep")]
fn s2_lockdep_detects_the_cycle_and_halts() {
    let _cpu = CpuGuard::new();
    let t1 = helpers::spawn(1);
    let t2 = helpers::spawn(1);
    let a = mutex::create(false).unwrap();
    let b = mutex::create(false).unwrap();

    helpers::set_current(t1);
    mutex::lock(a);
    helpers::set_current(t2);
    mutex::lock(b);

    // t1 parks on b (owned by t2) — no cycle yet, this must not halt.
    helpers::set_current(t1);
    mutex::test_block_on(b, t1);
    assert_eq!(thread::waiting_on(t1), Some(b));

    // t2 now tries for a, owned by t1, which is waiting on t2 via b: cycle.
    helpers::set_current(t2);
    assert!(helpers::halts(|| {
        mutex::lock(a);
    }));
}

/// Same two-mutex opposite-order setup with lockdep off (the default):
/// both threads end up blocked on each other with consistent owner/
/// waiting_on bookkeeping, and nothing halts.
#[test]
fn s2_without_lockdep_both_threads_end_up_blocked() {
    let _cpu = CpuGuard::new();
    let t1 = helpers::spawn(1);
    let t2 = helpers::spawn(1);
    let a = mutex::create(false).unwrap();
    let b = mutex::create(false).unwrap();

    helpers::set_current(t1);
    mutex::lock(a);
    helpers::set_current(t2);
    mutex::lock(b);

    helpers::set_current(t1);
    mutex::test_block_on(b, t1);
    helpers::set_current(t2);
    mutex::test_block_on(a, t2);

    assert_eq!(thread::state(t1), ThreadState::Blocked);
    assert_eq!(thread::state(t2), ThreadState::Blocked);
    assert_eq!(thread::waiting_on(t1), Some(b));
    assert_eq!(thread::waiting_on(t2), Some(a));
    assert_eq!(mutex::get(a).owner(), Some(t1));
    assert_eq!(mutex::get(b).owner(), Some(t2));
}

/// S3: a non-coherent DMA memcpy round-trips a 1024-byte buffer and fires
/// its completion callback exactly once.
#[test]
fn s3_dma_memcpy_round_trips_and_completes_once() {
    use core::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static mut SRC: [u8; 1024] = [0u8; 1024];
    static mut DST: [u8; 1024] = [0u8; 1024];

    unsafe {
        for (i, b) in SRC.iter_mut().enumerate() {
            *b = ((i * 7) & 0xFF) as u8;
        }
        for b in DST.iter_mut() {
            *b = 0;
        }
    }

    fn on_complete(_user: usize, status: i32) {
        assert_eq!(status, 0);
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    let before = CALLS.load(Ordering::SeqCst);
    let (src_addr, dst_addr) = unsafe {
        (
            core::ptr::addr_of!(SRC) as usize,
            core::ptr::addr_of_mut!(DST) as usize,
        )
    };
    let id = dma::submit(dst_addr, src_addr, 1024, on_complete, 0).unwrap();
    assert_eq!(dma::status(id), 1);
    dma::poll();
    assert_eq!(dma::status(id), 0);
    assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
    unsafe { assert_eq!(DST, SRC) };

    let _ = mmu::nc_alias_for(src_addr);
}

/// S5: strict-priority rotation. Three equal-priority threads rotate one
/// quantum each in FIFO order; a lower-priority thread never gets picked
/// while any of them is ready.
#[test]
#[cfg(feature = "sched-prio")]
fn s5_equal_priority_threads_rotate_and_never_yield_to_a_lower_one() {
    let _cpu = CpuGuard::new();
    let low = helpers::spawn(1);
    let e1 = helpers::spawn(10);
    let e2 = helpers::spawn(10);
    let e3 = helpers::spawn(10);

    sched::enqueue(low);
    sched::enqueue(e1);
    sched::enqueue(e2);
    sched::enqueue(e3);

    let mut cur = e1;
    for _ in 0..9 {
        let next = sched::pick_next(Some(cur), true).unwrap();
        assert_ne!(next, low, "low-priority thread must not run while equals are ready");
        cur = next;
    }
    // Over three rotations starting from e1, every equal-priority peer gets
    // picked at least once.
    let mut seen = [false; 3];
    let mut cur = e1;
    for _ in 0..3 {
        let next = sched::pick_next(Some(cur), true).unwrap();
        if next == e1 {
            seen[0] = true;
        } else if next == e2 {
            seen[1] = true;
        } else if next == e3 {
            seen[2] = true;
        }
        cur = next;
    }
    assert!(seen.iter().all(|&s| s));

    sched::dequeue(low);
    sched::dequeue(e1);
    sched::dequeue(e2);
    sched::dequeue(e3);
}

/// S6: a corrupted stack guard is caught on the next tick, which halts
/// with a diagnostic naming the offending thread instead of letting the
/// corruption silently propagate.
#[test]
fn s6_stack_overflow_is_caught_on_the_next_tick_with_the_thread_named() {
    let _cpu = CpuGuard::new();
    let id = helpers::spawn(5);
    helpers::set_current(id);
    helpers::reset_diag();

    thread::test_corrupt_guard(id);
    assert!(helpers::halts(|| {
        sched::sched_on_tick();
    }));

    let log = helpers::take_diag();
    assert!(log.contains("stack overflow detected on thread"));
}
