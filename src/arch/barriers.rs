//! Memory barriers and cache maintenance for a single AArch64 hart.
//!
//! Single-core preemptive scheduling still needs barriers: a thread can be
//! interrupted, context-switched, and resumed on the exact same core, and
//! the DMA engine's descriptors cross the coherency boundary a CPU-only
//! `dmb` doesn't cover. `dc_*_range` exists for that second case.

use core::sync::atomic::Ordering;

/// Inner-shareable data memory barrier. Used around context switches and
/// runqueue manipulation instead of `dmb sy`'s full-system scope.
#[inline(always)]
pub fn dmb_ish() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb ish", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(Ordering::SeqCst);
}

/// Inner-shareable data synchronization barrier: waits for prior memory
/// accesses to complete, not just order against them.
#[inline(always)]
pub fn dsb_ish() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dsb ish", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(Ordering::SeqCst);
}

/// Instruction synchronization barrier. Required after writing system
/// registers (e.g. `daif`, `mair_el1`, `ttbr0_el1`) whose effect subsequent
/// instructions depend on.
#[inline(always)]
pub fn isb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
}

/// Full-system DMA write barrier: orders CPU stores before a descriptor is
/// posted to a non-coherent device.
#[inline(always)]
pub fn dma_wmb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb oshst", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(Ordering::Release);
}

/// Full-system DMA read barrier: orders a completion read before the CPU
/// consumes data the device wrote.
#[inline(always)]
pub fn dma_rmb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb oshld", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(Ordering::Acquire);
}

/// Full-system DMA barrier, both directions.
#[inline(always)]
pub fn dma_mb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb osh", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(Ordering::SeqCst);
}

const CACHE_LINE_FALLBACK: usize = 64;

/// Data cache line size, read from `CTR_EL0.DminLine` (bits 16..19, log2 of
/// the line size in words). Falls back to 64 bytes if the field reads as
/// zero, which would otherwise produce a 4-byte "line" and a storm of
/// single-word cache ops.
#[inline(always)]
pub fn cache_line_size() -> usize {
    #[cfg(target_arch = "aarch64")]
    {
        let ctr: u64;
        unsafe {
            core::arch::asm!("mrs {0}, ctr_el0", out(reg) ctr, options(nostack, readonly));
        }
        let dminline = (ctr >> 16) & 0xF;
        if dminline == 0 {
            CACHE_LINE_FALLBACK
        } else {
            4usize << dminline
        }
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        CACHE_LINE_FALLBACK
    }
}

fn for_each_line(addr: usize, len: usize, mut op: impl FnMut(usize)) {
    let line_size = cache_line_size();
    let start = addr & !(line_size - 1);
    let end = addr.saturating_add(len);
    let mut line = start;
    while line < end {
        op(line);
        line += line_size;
    }
}

/// Clean (write back) `[addr, addr+len)` to the point of coherency. Used
/// before handing a buffer to a DMA-capable device.
pub fn dc_cvac_range(addr: usize, len: usize) {
    dmb_ish();
    #[cfg(target_arch = "aarch64")]
    for_each_line(addr, len, |line| unsafe {
        core::arch::asm!("dc cvac, {0}", in(reg) line, options(nostack, preserves_flags));
    });
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (addr, len);
    dsb_ish();
}

/// Clean and invalidate `[addr, addr+len)`. Used before a device writes
/// into a buffer the CPU will read back.
pub fn dc_civac_range(addr: usize, len: usize) {
    dmb_ish();
    #[cfg(target_arch = "aarch64")]
    for_each_line(addr, len, |line| unsafe {
        core::arch::asm!("dc civac, {0}", in(reg) line, options(nostack, preserves_flags));
    });
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (addr, len);
    dsb_ish();
}

/// Invalidate (discard) `[addr, addr+len)` without writing back. Only safe
/// when the CPU holds no live data in that range.
pub fn dc_ivac_range(addr: usize, len: usize) {
    dmb_ish();
    #[cfg(target_arch = "aarch64")]
    for_each_line(addr, len, |line| unsafe {
        core::arch::asm!("dc ivac, {0}", in(reg) line, options(nostack, preserves_flags));
    });
    #[cfg(not(target_arch = "aarch64"))]
    let _ = (addr, len);
    dsb_ish();
}
