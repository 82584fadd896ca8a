//! Local IRQ mask/restore pair used around any critical section that must
//! not be interrupted, not even by the tick.
//!
//! `daif` carries four mask bits (D, A, I, F); this crate only ever touches
//! the I bit (IRQ), so `local_irq_save` returns the whole register and
//! `local_irq_restore` writes it back verbatim rather than trying to
//! preserve individual bits itself.

use core::arch::asm;

/// Saved `daif` value, opaque outside this module.
#[derive(Debug, Clone, Copy)]
pub struct IrqFlags(u64);

/// Mask IRQs on this core and return the previous mask state.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn local_irq_save() -> IrqFlags {
    let flags: u64;
    unsafe {
        asm!(
            "mrs {0}, daif",
            "msr daifset, #2",
            "isb",
            out(reg) flags,
            options(nomem, nostack),
        );
    }
    IrqFlags(flags)
}

/// Restore a mask state previously returned by [`local_irq_save`].
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn local_irq_restore(flags: IrqFlags) {
    unsafe {
        asm!(
            "msr daif, {0}",
            in(reg) flags.0,
            options(nomem, nostack),
        );
    }
}

#[cfg(not(target_arch = "aarch64"))]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(target_arch = "aarch64"))]
static HOST_MASKED: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_arch = "aarch64"))]
pub fn local_irq_save() -> IrqFlags {
    let prev = HOST_MASKED.swap(true, Ordering::SeqCst);
    IrqFlags(prev as u64)
}

#[cfg(not(target_arch = "aarch64"))]
pub fn local_irq_restore(flags: IrqFlags) {
    HOST_MASKED.store(flags.0 != 0, Ordering::SeqCst);
}
