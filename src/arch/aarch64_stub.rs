//! Host-side stand-in for [`super::aarch64`], used when this crate is built
//! for anything other than `aarch64` (the `std-shim` test harness). No real
//! register state exists on the host, so [`Aarch64Context`] keeps the same
//! opaque saved-stack-pointer shape the real implementation uses, but
//! `context_switch` never actually swaps stacks — the host test harness
//! drives thread/scheduler bookkeeping directly instead of performing a
//! real architectural switch (see `src/tests`).

use super::Arch;

/// Opaque saved stack pointer, mirroring the real target's shape.
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

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(_state: *mut fpu::FpuState) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(_state: *const fpu::FpuState) {}

    fn enable_interrupts() {}
    fn disable_interrupts() {}
    fn interrupts_enabled() -> bool {
        true
    }
}

/// Stand-in for the real first-entry thunk. Never actually reached on the
/// host: `context_switch` above is a no-op, so `thread::do_switch` never
/// transfers control here. Exists only so `thread::build_initial_frame`
/// has a symbol address to embed in the (unused on this target) initial
/// frame.
pub fn thread_trampoline() {}

#[cfg(feature = "full-fpu")]
pub mod fpu {
    //! Layout-compatible stand-in for the real NEON bank; save/restore are
    //! no-ops on the host.
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
    pub unsafe fn save(_state: *mut FpuState) {}

    /// # Safety
    /// `state` must be valid for reads of `size_of::<FpuState>()` bytes.
    pub unsafe fn restore(_state: *const FpuState) {}

    pub fn zero_live_registers() {}
}
