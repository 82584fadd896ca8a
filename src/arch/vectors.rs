//! EL1 exception vector table and IRQ dispatch.
//!
//! Sixteen 0x80-byte slots, 2048-byte aligned, as AArch64 requires. Only
//! the "current EL, SPx" IRQ slot does real work; the other fourteen slots
//! (synchronous, FIQ, SError across all four vector groups, since this
//! kernel deliberately triggers none of them) fall into a diagnostic halt.

use core::arch::naked_asm;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::gic::{Gic, GicV3, SPURIOUS_IRQ, TIMER_PPI_PHYS, TIMER_PPI_VIRT};
use crate::arch::cpu_local::cpu_local;
use crate::diag_println;

/// Saved IRQ frame: x0-x18 (19 regs), LR, pre-IRQ SP, SPSR, ELR, and one
/// pad word to keep the frame a 16-byte-aligned 192 bytes.
#[repr(C)]
pub struct IrqFrame {
    pub x: [u64; 19],
    pub lr: u64,
    pub sp: u64,
    pub spsr: u64,
    pub elr: u64,
    _pad: u64,
}

const FRAME_BYTES: usize = core::mem::size_of::<IrqFrame>();
const _: () = assert!(FRAME_BYTES == 192);

/// Top of the per-CPU IRQ stack, set once during boot before interrupts
/// are unmasked. Read directly by the entry asm (a plain memory load, no
/// function call, so no interrupted register needs to survive a `bl`
/// before the frame exists to hold it).
static IRQ_STACK_TOP: AtomicUsize = AtomicUsize::new(0);

/// Record the per-CPU IRQ stack's top address for the vector entry to use.
pub fn set_irq_stack_top(top: usize) {
    IRQ_STACK_TOP.store(top, Ordering::Release);
    cpu_local().irq_stack_top.store(top, Ordering::Release);
}

/// Install the vector table by pointing `VBAR_EL1` at it.
///
/// # Safety
/// Must run once during boot, before interrupts are unmasked.
pub unsafe fn install_vector_table() {
    unsafe {
        core::arch::asm!(
            "adrp {0}, {table}",
            "add {0}, {0}, :lo12:{table}",
            "msr vbar_el1, {0}",
            "isb",
            out(reg) _,
            table = sym vector_table,
            options(nostack),
        );
    }
}

extern "C" fn unhandled_exception() -> ! {
    diag_println!("unhandled exception, halting");
    loop {
        unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
    }
}

#[unsafe(naked)]
unsafe extern "C" fn not_irq() -> ! {
    naked_asm!("b {h}", h = sym unhandled_exception)
}

/// IRQ entry: stash the interrupted x0 aside, compute the IRQ-stack frame
/// address, save the rest of the caller-saved set plus LR/SP/SPSR/ELR into
/// it, switch SP there, hand off to the Rust dispatcher, then unwind and
/// `eret`.
#[unsafe(naked)]
unsafe extern "C" fn irq_el1h() -> ! {
    naked_asm!(
        "msr tpidrro_el0, x0",
        "adrp x0, {stack_top}",
        "add x0, x0, :lo12:{stack_top}",
        "ldr x0, [x0]",
        "sub x0, x0, {frame_bytes}",
        "stp x1, x2,   [x0, #8]",
        "stp x3, x4,   [x0, #24]",
        "stp x5, x6,   [x0, #40]",
        "stp x7, x8,   [x0, #56]",
        "stp x9, x10,  [x0, #72]",
        "stp x11, x12, [x0, #88]",
        "stp x13, x14, [x0, #104]",
        "stp x15, x16, [x0, #120]",
        "stp x17, x18, [x0, #136]",
        "str x30, [x0, #152]",
        "mov x1, sp",
        "str x1, [x0, #160]",
        "mrs x1, spsr_el1",
        "str x1, [x0, #168]",
        "mrs x1, elr_el1",
        "str x1, [x0, #176]",
        "mrs x1, tpidrro_el0",
        "str x1, [x0, #0]",
        "mov sp, x0",
        "bl {dispatch}",
        // x0 on return is the same frame pointer (the handler returns its
        // argument unchanged); reload everything from it.
        "ldr x1, [x0, #168]",
        "msr spsr_el1, x1",
        "ldr x1, [x0, #176]",
        "msr elr_el1, x1",
        "ldr x30, [x0, #152]",
        "ldp x1, x2,   [x0, #8]",
        "ldp x3, x4,   [x0, #24]",
        "ldp x5, x6,   [x0, #40]",
        "ldp x7, x8,   [x0, #56]",
        "ldp x9, x10,  [x0, #72]",
        "ldp x11, x12, [x0, #88]",
        "ldp x13, x14, [x0, #104]",
        "ldp x15, x16, [x0, #120]",
        "ldp x17, x18, [x0, #136]",
        "ldr x2, [x0, #160]",
        "ldr x0, [x0, #0]",
        "mov sp, x2",
        "eret",
        stack_top = sym IRQ_STACK_TOP,
        frame_bytes = const FRAME_BYTES,
        dispatch = sym irq_handler_el1,
    )
}

/// Rust IRQ handler body. Takes and returns the frame pointer in x0 so the
/// entry asm can reload uniformly regardless of what the handler did.
extern "C" fn irq_handler_el1(frame: *mut IrqFrame) -> *mut IrqFrame {
    let cpu = cpu_local();
    cpu.irq_depth.fetch_add(1, Ordering::Relaxed);

    let id = GicV3::ack();
    match id {
        TIMER_PPI_VIRT | TIMER_PPI_PHYS => {
            crate::time::tick();
            GicV3::eoi(id);
        }
        SPURIOUS_IRQ => {
            // Consumed without EOI, per the GICv3 spurious-ID contract.
        }
        other => {
            diag_println!("unrecognized irq {}", other);
            GicV3::eoi(other);
        }
    }

    cpu.irq_depth.fetch_sub(1, Ordering::Relaxed);

    let preempt_idle = cpu.preempt_cnt.load(Ordering::Relaxed) == 0;
    if cpu.current_thread.get().is_some() && preempt_idle && cpu.needs_resched() {
        unsafe {
            (*frame).elr = crate::preempt::preempt_return as usize as u64;
        }
    }

    frame
}

#[repr(align(2048))]
struct VectorTableAlign;
const _: VectorTableAlign = VectorTableAlign;

#[unsafe(naked)]
unsafe extern "C" fn vector_table() {
    naked_asm!(
        ".balign 2048",
        // Current EL, SP0 — never used (EL1h only).
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        // Current EL, SPx — the group this kernel runs under.
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        // Lower EL, AArch64 — never used (no EL0 component).
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        // Lower EL, AArch32 — never used.
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        ".balign 0x80", "b {not_irq}",
        not_irq = sym not_irq,
        irq = sym irq_el1h,
    )
}
