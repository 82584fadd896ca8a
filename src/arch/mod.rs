//! Architecture abstraction layer for context switching, FPU state, and
//! interrupt masking on a single AArch64 hart.

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations involve direct hardware manipulation and inline
/// assembly. All methods marked unsafe have preconditions the caller must
/// uphold.
pub trait Arch {
    /// Opaque saved stack pointer. Contains no register state of its own —
    /// the six callee-saved pairs live on the thread's own stack.
    type SavedContext: Send + Sync + Default;

    /// Switch from one thread's stack to another.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly initialized
    ///   `SavedContext` values
    /// - must be called with interrupts disabled
    /// - `next` must either be the zero context of a never-run thread with
    ///   a freshly built stack, or a context previously populated by this
    ///   same function
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Save the FPU/NEON register bank.
    ///
    /// # Safety
    /// `state` must be valid for writes of the full register bank.
    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(state: *mut aarch64::fpu::FpuState);

    /// Restore the FPU/NEON register bank.
    ///
    /// # Safety
    /// `state` must contain a previously saved bank, or be zeroed.
    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(state: *const aarch64::fpu::FpuState);

    fn enable_interrupts();
    fn disable_interrupts();
    fn interrupts_enabled() -> bool;
}

/// No-op architecture for host-side tests (`std-shim`).
pub struct NoOpArch;

impl Arch for NoOpArch {
    type SavedContext = ();

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(_state: *mut aarch64::fpu::FpuState) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(_state: *const aarch64::fpu::FpuState) {}

    fn enable_interrupts() {}
    fn disable_interrupts() {}
    fn interrupts_enabled() -> bool {
        true
    }
}

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(not(target_arch = "aarch64"))]
#[path = "aarch64_stub.rs"]
pub mod aarch64;

pub mod barriers;
pub mod cpu_local;
pub mod irqflags;
pub mod uart;

#[cfg(target_arch = "aarch64")]
pub mod aarch64_boot;
#[cfg(target_arch = "aarch64")]
pub mod gic;
#[cfg(target_arch = "aarch64")]
pub mod uart_pl011;
#[cfg(target_arch = "aarch64")]
pub mod vectors;

#[cfg(target_arch = "aarch64")]
pub use aarch64::Aarch64Arch as DefaultArch;

#[cfg(all(not(target_arch = "aarch64"), feature = "std-shim"))]
pub use NoOpArch as DefaultArch;

#[cfg(all(not(target_arch = "aarch64"), not(feature = "std-shim")))]
compile_error!(
    "this crate only targets aarch64; enable the std-shim feature to build the host test harness"
);

/// Fatal-path halt (§7: stack-guard mismatch, lockdep cycle, reentrant IRQ
/// misuse, return from `sched_start`). On real hardware this masks
/// interrupts and parks in `wfe` forever; under the host test harness it
/// panics instead, so `#[should_panic]` tests can observe the fatal path
/// without hanging the test process.
#[cfg(target_arch = "aarch64")]
pub fn halt() -> ! {
    aarch64_boot::halt();
}

#[cfg(not(target_arch = "aarch64"))]
pub fn halt() -> ! {
    panic!("kernel halt");
}
