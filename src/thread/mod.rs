//! Thread records and the scheduling-adjacent bookkeeping every other
//! component reaches into: owned-mutex lists, wait-queue links, priority
//! state.
//!
//! Grounded in `thread.cc`/`thread.h`: a thread is a fixed-size record
//! with its saved stack pointer first (so the low-level switch can reach
//! it without knowing the rest of the layout), living in a fixed-capacity
//! arena rather than behind a heap pointer. Cross-references to other
//! threads and to mutexes are small integer handles into their own arenas,
//! per the Design Notes re-architecture guidance, not raw pointers.

use core::cell::Cell;

use crate::arch::{Arch, DefaultArch};
use crate::errors::{KernelResult, SpawnError};
use crate::mem::stack_arena;
use crate::sync::mutex::MutexId;

/// Maximum number of threads the kernel can host. Sized for the lab
/// scenarios in §8 (at most three or four live threads at once); a real
/// deployment would size this from a build-time constant the way
/// [`crate::mem::boot_alloc::BOOT_HEAP_BYTES`] is sized.
pub const MAX_THREADS: usize = 32;

/// How many mutexes a single thread may hold at once before `owned_mutex_add`
/// has nowhere to put the new entry. Generous for the PI chains this crate
/// models (§8 S1/S2 use at most two).
pub const MAX_OWNED_MUTEXES: usize = 8;

/// Ticks a thread may run before a rotation is requested (the "Quantum").
pub const QUANTUM: u32 = 5;

pub const MAX_PRIORITY: u8 = 31;

/// Index into the thread arena. Never zero-valued to keep the niche
/// optimization available on `Option<ThreadId>` the way
/// `core::num::NonZeroUsize` would, but the kernel only ever compares and
/// copies these, so a plain `usize` plus the `INVALID` sentinel used
/// internally to the arena keeps construction infallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Blocked,
}

/// FPU context: the full vector bank plus control words, lazily loaded.
#[cfg(feature = "full-fpu")]
#[derive(Clone, Copy)]
struct FpuContext {
    state: crate::arch::aarch64::fpu::FpuState,
    valid: bool,
}

#[cfg(feature = "full-fpu")]
impl FpuContext {
    const fn new() -> Self {
        Self {
            state: crate::arch::aarch64::fpu::FpuState {
                q: [0; 32],
                fpcr: 0,
                fpsr: 0,
            },
            valid: false,
        }
    }
}

type EntryFn = fn(usize);

struct Thread {
    /// Saved stack pointer. Written/read only by `arch_switch`; everything
    /// else goes through the `Cell` fields below.
    sp: Cell<*mut u8>,
    entry: Cell<Option<EntryFn>>,
    arg: Cell<usize>,
    ring_next: Cell<Option<ThreadId>>,
    stack_base: Cell<usize>,
    stack_size: Cell<usize>,
    budget: Cell<u32>,
    base_prio: Cell<u8>,
    effective_prio: Cell<u8>,
    state: Cell<ThreadState>,
    wait_next: Cell<Option<ThreadId>>,
    waiting_on: Cell<Option<MutexId>>,
    owned: Cell<[Option<MutexId>; MAX_OWNED_MUTEXES]>,
    #[cfg(feature = "full-fpu")]
    fpu: Cell<FpuContext>,
}

unsafe impl Sync for Thread {}

impl Thread {
    const fn new() -> Self {
        Self {
            sp: Cell::new(core::ptr::null_mut()),
            entry: Cell::new(None),
            arg: Cell::new(0),
            ring_next: Cell::new(None),
            stack_base: Cell::new(0),
            stack_size: Cell::new(0),
            budget: Cell::new(0),
            base_prio: Cell::new(0),
            effective_prio: Cell::new(0),
            state: Cell::new(ThreadState::Ready),
            wait_next: Cell::new(None),
            waiting_on: Cell::new(None),
            owned: Cell::new([None; MAX_OWNED_MUTEXES]),
            #[cfg(feature = "full-fpu")]
            fpu: Cell::new(FpuContext::new()),
        }
    }
}

const NO_THREAD: Thread = Thread::new();
static ARENA: [Thread; MAX_THREADS] = [NO_THREAD; MAX_THREADS];
static NEXT_SLOT: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);

fn slot(id: ThreadId) -> &'static Thread {
    &ARENA[id.0]
}

/// Allocate the next free arena slot. Slots are never reclaimed (§3:
/// "stacks are not reclaimed" after `thread_exit`), so this is a plain
/// bump index, mirroring `mem::boot_alloc::Arena::claim`.
fn claim_slot() -> Option<ThreadId> {
    loop {
        let cur = NEXT_SLOT.load(core::sync::atomic::Ordering::Relaxed);
        if cur >= MAX_THREADS {
            return None;
        }
        if NEXT_SLOT
            .compare_exchange_weak(
                cur,
                cur + 1,
                core::sync::atomic::Ordering::AcqRel,
                core::sync::atomic::Ordering::Relaxed,
            )
            .is_ok()
        {
            return Some(ThreadId(cur));
        }
    }
}

/// Build the initial stack frame `arch_switch` expects: six saved
/// register pairs (x19..x30), with x30 (the second slot of the last pair)
/// holding `thread_trampoline`'s address so the very first restore falls
/// straight into it.
fn build_initial_frame(stack_top: usize) -> *mut u8 {
    const FRAME_BYTES: usize = 96;
    let sp = (stack_top - FRAME_BYTES) as *mut u8;
    unsafe {
        core::ptr::write_bytes(sp, 0, FRAME_BYTES);
        let words = sp as *mut u64;
        // Offset 80 holds the x29/x30 pair; x30 (the link register the
        // restore sequence returns into) goes at byte 88.
        *words.add(11) = crate::arch::aarch64::thread_trampoline as usize as u64;
    }
    sp
}

/// Create a new thread. Validates `stack_bytes` (non-zero, multiple of
/// 16) and `base_prio` (`<= 31`) before touching the stack arena, per
/// §4.G.
pub fn create(entry: EntryFn, arg: usize, stack_bytes: usize, base_prio: u8) -> KernelResult<ThreadId> {
    if stack_bytes == 0 || stack_bytes % 16 != 0 {
        return Err(SpawnError::InvalidStackSize(stack_bytes).into());
    }
    if base_prio > MAX_PRIORITY {
        return Err(SpawnError::InvalidPriority(base_prio).into());
    }
    let id = claim_slot().ok_or(SpawnError::ThreadArenaExhausted)?;
    let base = stack_arena::allocate(stack_bytes).ok_or(SpawnError::StackArenaExhausted)?;
    unsafe { stack_arena::init_guard_and_watermark(base, stack_bytes) };

    let t = slot(id);
    t.entry.set(Some(entry));
    t.arg.set(arg);
    t.stack_base.set(base);
    t.stack_size.set(stack_bytes);
    t.budget.set(QUANTUM);
    let clamped = base_prio.min(MAX_PRIORITY);
    t.base_prio.set(clamped);
    t.effective_prio.set(clamped);
    t.state.set(ThreadState::Ready);
    t.waiting_on.set(None);
    t.wait_next.set(None);
    t.ring_next.set(None);
    t.owned.set([None; MAX_OWNED_MUTEXES]);
    #[cfg(feature = "full-fpu")]
    t.fpu.set(FpuContext::new());
    t.sp.set(build_initial_frame(base + stack_bytes));

    Ok(id)
}

/// Force `Ready` and append to the runqueue.
pub fn sched_add(id: ThreadId) {
    slot(id).state.set(ThreadState::Ready);
    crate::sched::enqueue(id);
}

pub fn state(id: ThreadId) -> ThreadState {
    slot(id).state.get()
}

pub fn set_state(id: ThreadId, state: ThreadState) {
    slot(id).state.set(state);
}

pub fn base_priority(id: ThreadId) -> u8 {
    slot(id).base_prio.get()
}

pub fn effective_priority(id: ThreadId) -> u8 {
    slot(id).effective_prio.get()
}

pub fn budget(id: ThreadId) -> u32 {
    slot(id).budget.get()
}

pub fn set_budget(id: ThreadId, v: u32) {
    slot(id).budget.set(v);
}

pub fn ring_next(id: ThreadId) -> Option<ThreadId> {
    slot(id).ring_next.get()
}

pub fn set_ring_next(id: ThreadId, next: Option<ThreadId>) {
    slot(id).ring_next.set(next);
}

pub fn wait_next(id: ThreadId) -> Option<ThreadId> {
    slot(id).wait_next.get()
}

pub fn set_wait_next(id: ThreadId, next: Option<ThreadId>) {
    slot(id).wait_next.set(next);
}

pub fn waiting_on(id: ThreadId) -> Option<MutexId> {
    slot(id).waiting_on.get()
}

pub fn set_waiting_on(id: ThreadId, m: Option<MutexId>) {
    slot(id).waiting_on.set(m);
}

/// Owner of the mutex `id` is blocked on, if any. Used by the lockdep walk
/// (`sync::mutex::would_deadlock`).
pub fn waiting_on_owner(id: ThreadId) -> Option<ThreadId> {
    let m = slot(id).waiting_on.get()?;
    crate::sync::mutex::owner_of(m)
}

pub fn owned_mutex_add(id: ThreadId, m: MutexId) {
    let t = slot(id);
    let mut owned = t.owned.get();
    for slot in owned.iter_mut() {
        if slot.is_none() {
            *slot = Some(m);
            t.owned.set(owned);
            return;
        }
    }
    // Arena sized generously (§ MAX_OWNED_MUTEXES); silently dropping here
    // would violate invariant 3, so this is a programming error.
    crate::diag_println!("owned-mutex list full for thread, halting");
    crate::arch::halt();
}

pub fn owned_mutex_remove(id: ThreadId, m: MutexId) {
    let t = slot(id);
    let mut owned = t.owned.get();
    for slot in owned.iter_mut() {
        if *slot == Some(m) {
            *slot = None;
            break;
        }
    }
    t.owned.set(owned);
}

/// Recompute this thread's effective priority from its base and the
/// waiters of every owned, PI-enabled mutex (§4.K Priority Inheritance).
/// Clamped to `[base, 31]`.
pub fn recompute_effective_priority(id: ThreadId) {
    let t = slot(id);
    let base = t.base_prio.get();
    let mut best = base;
    for m in t.owned.get().into_iter().flatten() {
        if let Some(p) = crate::sync::mutex::pi_contribution(m) {
            if p > best {
                best = p;
            }
        }
    }
    t.effective_prio.set(best.min(MAX_PRIORITY));
}

/// Current thread on this hart. Panics (programming error, not a fallible
/// path) if called before `sched_start`.
pub fn current() -> ThreadId {
    crate::arch::cpu_local::cpu_local()
        .current_thread
        .get()
        .expect("thread::current() called before sched_start")
}

pub fn request_resched() {
    crate::arch::cpu_local::cpu_local()
        .set_need_resched(crate::arch::cpu_local::NeedResched::Normal);
}

/// Park the current thread off the runqueue (caller has already linked it
/// onto a wait queue and set `waiting_on`/`wait_next`). Must run with
/// preemption disabled; returns once this thread is rescheduled.
pub fn sched_block_current() {
    let me = current();
    crate::sched::dequeue(me);
    set_state(me, ThreadState::Blocked);
    request_resched();
}

/// Make a blocked thread runnable again (pops it from whatever wait queue
/// it was on — the caller does that unlinking — and appends it to the
/// runqueue).
pub fn sched_make_runnable(id: ThreadId) {
    set_state(id, ThreadState::Ready);
    crate::sched::enqueue(id);
}

/// Cooperative yield: no-op if preemption is disabled or nothing else is
/// runnable.
pub fn thread_yield() {
    use crate::arch::cpu_local::cpu_local;
    if cpu_local().preempt_cnt.load(core::sync::atomic::Ordering::Relaxed) != 0 {
        return;
    }
    crate::preempt::preempt_disable();
    let cur = current();
    if let Some(next) = crate::sched::pick_for_yield(cur) {
        if next != cur {
            do_switch(cur, next);
        }
    }
    crate::preempt::preempt_enable();
}

/// Stack guard check, run once per tick before budget accounting (§4.N).
pub fn guard_ok(id: ThreadId) -> bool {
    let t = slot(id);
    unsafe { stack_arena::guard_ok(t.stack_base.get(), t.stack_size.get()) }
}

pub fn high_water_mark(id: ThreadId) -> usize {
    let t = slot(id);
    unsafe { stack_arena::high_water_mark(t.stack_base.get(), t.stack_size.get()) }
}

/// Low-level register switch plus FPU save/restore (§4.H). Called by the
/// scheduler whenever it decides `next` should replace `cur` on core.
pub fn do_switch(cur: ThreadId, next: ThreadId) {
    let cur_t = slot(cur);
    let next_t = slot(next);

    #[cfg(feature = "full-fpu")]
    {
        let mut fpu = cur_t.fpu.get();
        unsafe { DefaultArch::save_fpu(&mut fpu.state as *mut _) };
        fpu.valid = true;
        cur_t.fpu.set(fpu);
    }

    crate::arch::cpu_local::cpu_local()
        .current_thread
        .set(Some(next));

    unsafe {
        DefaultArch::context_switch(
            cur_t.sp.as_ptr() as *mut <DefaultArch as Arch>::SavedContext,
            next_t.sp.as_ptr() as *const <DefaultArch as Arch>::SavedContext,
        );
    }

    #[cfg(feature = "full-fpu")]
    {
        let now = current();
        let t = slot(now);
        let mut fpu = t.fpu.get();
        if !fpu.valid {
            crate::arch::aarch64::fpu::zero_live_registers();
            fpu.valid = true;
            t.fpu.set(fpu);
        } else {
            unsafe { DefaultArch::restore_fpu(&fpu.state as *const _) };
        }
    }
}

/// Jump to `id` with no previous thread to save into (boot-time entry from
/// `sched::sched_start`). A genuine return from the underlying assembly
/// switch (host `std-shim` builds aside, where it's a deliberate no-op) is
/// a fatal programming error.
pub fn enter_first(id: ThreadId) -> ! {
    let t = slot(id);
    #[cfg(feature = "full-fpu")]
    {
        crate::arch::aarch64::fpu::zero_live_registers();
        let mut fpu = t.fpu.get();
        fpu.valid = true;
        t.fpu.set(fpu);
    }
    let mut dummy = <DefaultArch as Arch>::SavedContext::default();
    unsafe {
        DefaultArch::context_switch(
            &mut dummy as *mut <DefaultArch as Arch>::SavedContext,
            t.sp.as_ptr() as *const <DefaultArch as Arch>::SavedContext,
        );
    }
    crate::diag_println!("enter_first returned unexpectedly, halting");
    crate::arch::halt();
}

/// Called by `arch::aarch64::thread_trampoline` the first time a thread's
/// stack is ever entered.
pub fn run_current() {
    let me = current();
    let t = slot(me);
    if let Some(entry) = t.entry.get() {
        entry(t.arg.get());
    }
}

/// Log and halt (§4.G: "no reaper", §7). Resolves the spec's open question
/// against `thread.cc`: does not yield first.
pub fn exit() -> ! {
    let me = current();
    crate::diag_println!("thread {} exited, halting CPU", me.0);
    crate::arch::halt();
}

pub fn exit_current() -> ! {
    exit()
}

/// Corrupt the low 8 bytes of `id`'s stack guard. Test-only: there is no
/// production path that touches a thread's stack from outside its own
/// execution, so the host harness has no other way to arm the `guard_ok`
/// trap exercised by `sched::sched_on_tick`.
#[cfg(test)]
pub(crate) fn test_corrupt_guard(id: ThreadId) {
    let t = slot(id);
    unsafe {
        core::ptr::write_bytes(t.stack_base.get() as *mut u8, 0, 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_stack_size() {
        let err = create(|_| {}, 0, 0, 0).unwrap_err();
        assert!(matches!(err, crate::errors::KernelError::Spawn(SpawnError::InvalidStackSize(0))));
        let err = create(|_| {}, 0, 17, 0).unwrap_err();
        assert!(matches!(err, crate::errors::KernelError::Spawn(SpawnError::InvalidStackSize(17))));
    }

    #[test]
    fn create_validates_priority() {
        let err = create(|_| {}, 0, 4096, 32).unwrap_err();
        assert!(matches!(err, crate::errors::KernelError::Spawn(SpawnError::InvalidPriority(32))));
    }

    #[test]
    fn create_clamps_and_sets_ready() {
        let id = create(|_| {}, 0, 4096, 5).unwrap();
        assert_eq!(base_priority(id), 5);
        assert_eq!(effective_priority(id), 5);
        assert_eq!(state(id), ThreadState::Ready);
        assert_eq!(budget(id), QUANTUM);
        assert!(guard_ok(id));
    }
}
