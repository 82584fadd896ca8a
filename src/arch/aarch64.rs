//! AArch64 context switch, FPU save/restore, and IRQ masking.
//!
//! Context switching here is a bare stack-pointer swap: only the six
//! AAPCS64 callee-saved register pairs (x19-x30) are preserved on the
//! outgoing thread's own stack before the switch, and restored from the
//! incoming thread's stack after. Caller-saved registers need no help —
//! the compiler already spills anything live across a call — and the
//! full x0-x30 register bank a context struct would otherwise need never
//! has to exist.

use core::arch::naked_asm;
use core::sync::atomic::{AtomicU64, Ordering};

use super::Arch;

/// A suspended thread's saved stack pointer. `None`/null means "never run
/// yet" — [`thread_trampoline`] is the entry point the first switch lands
/// on.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct Aarch64Context(pub *mut u8);

unsafe impl Send for Aarch64Context {}
unsafe impl Sync for Aarch64Context {}

impl Default for Aarch64Context {
    fn default() -> Self {
        Self(core::ptr::null_mut())
    }
}

pub type SavedContext = Aarch64Context;

pub struct Aarch64Arch;

impl Arch for Aarch64Arch {
    type SavedContext = Aarch64Context;

    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext) {
        unsafe {
            arch_switch(&mut (*prev).0, (*next).0);
        }
    }

    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(state: *mut fpu::FpuState) {
        unsafe { fpu::save(state) };
    }

    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(state: *const fpu::FpuState) {
        unsafe { fpu::restore(state) };
    }

    fn enable_interrupts() {
        unsafe {
            core::arch::asm!("msr daifclr, #2", options(nomem, nostack));
        }
    }

    fn disable_interrupts() {
        unsafe {
            core::arch::asm!("msr daifset, #2", options(nomem, nostack));
        }
    }

    fn interrupts_enabled() -> bool {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {0}, daif", out(reg) daif, options(nostack, readonly));
        }
        (daif & 0x80) == 0
    }
}

/// Swap the running stack. `*prev_sp_slot` receives the current stack
/// pointer; execution resumes on `next_sp`.
///
/// `next_sp` must either be a pointer previously produced by this same
/// function (stored by an earlier call through `prev_sp_slot`) or a stack
/// freshly laid out by `crate::thread::stack` with a frame that makes the
/// restore below land in [`thread_trampoline`].
///
/// # Safety
///
/// Both stacks must be live, non-overlapping, and sized for at least the
/// 96-byte save area this function uses.
#[unsafe(naked)]
pub unsafe extern "C" fn arch_switch(prev_sp_slot: *mut *mut u8, next_sp: *mut u8) {
    naked_asm!(
        "sub sp, sp, #96",
        "stp x19, x20, [sp, #0]",
        "stp x21, x22, [sp, #16]",
        "stp x23, x24, [sp, #32]",
        "stp x25, x26, [sp, #48]",
        "stp x27, x28, [sp, #64]",
        "stp x29, x30, [sp, #80]",
        "mov x2, sp",
        "str x2, [x0]",
        "mov sp, x1",
        "ldp x19, x20, [sp, #0]",
        "ldp x21, x22, [sp, #16]",
        "ldp x23, x24, [sp, #32]",
        "ldp x25, x26, [sp, #48]",
        "ldp x27, x28, [sp, #64]",
        "ldp x29, x30, [sp, #80]",
        "add sp, sp, #96",
        "ret",
    )
}

/// First-entry thunk for a thread that has never run. A freshly built
/// stack is laid out so that [`arch_switch`]'s restore sequence loads x30
/// with the address of this function and falls straight into it.
///
/// # Safety
///
/// Must only ever be reached via `arch_switch`, never called directly.
#[unsafe(naked)]
pub unsafe extern "C" fn thread_trampoline() -> ! {
    naked_asm!(
        "bl {entry}",
        "b {exit}",
        entry = sym trampoline_entry,
        exit = sym trampoline_exit,
    )
}

extern "C" fn trampoline_entry() {
    crate::thread::run_current();
}

extern "C" fn trampoline_exit() -> ! {
    crate::thread::exit_current()
}

#[cfg(feature = "full-fpu")]
pub mod fpu {
    //! NEON/FPU bank save and restore, laid out to mirror the 32 x 128-bit
    //! `q` register file plus `fpcr`/`fpsr`.
    use core::arch::asm;

    /// `q0..q31` (512 bytes) followed by the two 32-bit control words.
    #[repr(C, align(16))]
    #[derive(Debug, Clone, Copy)]
    pub struct FpuState {
        pub q: [u128; 32],
        pub fpcr: u32,
        pub fpsr: u32,
    }

    impl Default for FpuState {
        fn default() -> Self {
            Self {
                q: [0; 32],
                fpcr: 0,
                fpsr: 0,
            }
        }
    }

    /// # Safety
    /// `state` must be valid for writes of `size_of::<FpuState>()` bytes.
    pub unsafe fn save(state: *mut FpuState) {
        unsafe {
            asm!(
                "stp q0, q1,   [{p}, #0]",
                "stp q2, q3,   [{p}, #32]",
                "stp q4, q5,   [{p}, #64]",
                "stp q6, q7,   [{p}, #96]",
                "stp q8, q9,   [{p}, #128]",
                "stp q10, q11, [{p}, #160]",
                "stp q12, q13, [{p}, #192]",
                "stp q14, q15, [{p}, #224]",
                "stp q16, q17, [{p}, #256]",
                "stp q18, q19, [{p}, #288]",
                "stp q20, q21, [{p}, #320]",
                "stp q22, q23, [{p}, #352]",
                "stp q24, q25, [{p}, #384]",
                "stp q26, q27, [{p}, #416]",
                "stp q28, q29, [{p}, #448]",
                "stp q30, q31, [{p}, #480]",
                "mrs x9, fpcr",
                "str w9, [{p}, #512]",
                "mrs x9, fpsr",
                "str w9, [{p}, #516]",
                p = in(reg) state,
                out("x9") _,
                options(nostack),
            );
        }
    }

    /// # Safety
    /// `state` must be valid for reads of `size_of::<FpuState>()` bytes.
    pub unsafe fn restore(state: *const FpuState) {
        unsafe {
            asm!(
                "ldr w9, [{p}, #512]",
                "msr fpcr, x9",
                "ldr w9, [{p}, #516]",
                "msr fpsr, x9",
                "ldp q0, q1,   [{p}, #0]",
                "ldp q2, q3,   [{p}, #32]",
                "ldp q4, q5,   [{p}, #64]",
                "ldp q6, q7,   [{p}, #96]",
                "ldp q8, q9,   [{p}, #128]",
                "ldp q10, q11, [{p}, #160]",
                "ldp q12, q13, [{p}, #192]",
                "ldp q14, q15, [{p}, #224]",
                "ldp q16, q17, [{p}, #256]",
                "ldp q18, q19, [{p}, #288]",
                "ldp q20, q21, [{p}, #320]",
                "ldp q22, q23, [{p}, #352]",
                "ldp q24, q25, [{p}, #384]",
                "ldp q26, q27, [{p}, #416]",
                "ldp q28, q29, [{p}, #448]",
                "ldp q30, q31, [{p}, #480]",
                p = in(reg) state,
                out("x9") _,
                options(nostack),
            );
        }
    }

    /// Zero the live vector bank. Used the first time a thread touches the
    /// FPU, before it has any saved state of its own.
    pub fn zero_live_registers() {
        unsafe {
            asm!(
                "eor v0.16b, v0.16b, v0.16b",
                "eor v1.16b, v1.16b, v1.16b",
                "eor v2.16b, v2.16b, v2.16b",
                "eor v3.16b, v3.16b, v3.16b",
                "eor v4.16b, v4.16b, v4.16b",
                "eor v5.16b, v5.16b, v5.16b",
                "eor v6.16b, v6.16b, v6.16b",
                "eor v7.16b, v7.16b, v7.16b",
                options(nostack, nomem),
            );
        }
    }
}

static TIMER_FREQ: AtomicU64 = AtomicU64::new(0);

/// Read and cache `cntfrq_el0` for later tick/ns conversions.
pub fn init() {
    let freq: u64;
    unsafe {
        core::arch::asm!("mrs {0}, cntfrq_el0", out(reg) freq, options(nostack, readonly));
    }
    TIMER_FREQ.store(freq, Ordering::Relaxed);
}

/// Current `cntpct_el0` value.
pub fn get_timestamp() -> u64 {
    let count: u64;
    unsafe {
        core::arch::asm!("mrs {0}, cntpct_el0", out(reg) count, options(nostack, readonly));
    }
    count
}

pub fn ticks_to_ns(ticks: u64) -> u64 {
    let freq = TIMER_FREQ.load(Ordering::Relaxed);
    if freq == 0 {
        return 0;
    }
    (ticks as u128 * 1_000_000_000 / freq as u128) as u64
}

pub fn ns_to_ticks(ns: u64) -> u64 {
    let freq = TIMER_FREQ.load(Ordering::Relaxed);
    if freq == 0 {
        return 0;
    }
    (ns as u128 * freq as u128 / 1_000_000_000) as u64
}

/// Invalidate instruction caches after code has been written (not used by
/// the scheduler itself, kept for collaborators that load code at runtime).
///
/// # Safety
/// Must run in EL1.
pub unsafe fn flush_icache() {
    unsafe {
        core::arch::asm!("ic ialluis", "dsb ish", "isb", options(nomem, nostack));
    }
}
