//! Priority and DMA smoke test: a low-priority background thread, a
//! high-priority thread that submits a DMA memcpy and waits on it, and a
//! completion callback that reports the transfer status.
//!
//! Build with `--features sched-prio` to see the high-priority thread
//! always win the CPU over the background thread; with the default
//! `sched-rr` both threads simply alternate by quantum.
//!
//! # Building
//!
//! ```bash
//! cargo build --release --features "qemu-virt sched-prio" --target aarch64-unknown-none
//! ```
//!
//! # Running
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 512M \
//!     -kernel target/aarch64-unknown-none/release/examples/rpi_kernel \
//!     -nographic
//! ```
//!
//! Press Ctrl-A X to exit QEMU.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, Ordering};

use preemptive_kernel_core::{dma, diag_println, kernel, thread};

static SRC: [u8; 256] = {
    let mut buf = [0u8; 256];
    let mut i = 0;
    while i < buf.len() {
        buf[i] = (i * 7) as u8;
        i += 1;
    }
    buf
};
static mut DST: [u8; 256] = [0u8; 256];
static DMA_DONE: AtomicBool = AtomicBool::new(false);

fn on_dma_complete(_user: usize, status: i32) {
    diag_println!("[DMA] completed with status {}", status);
    DMA_DONE.store(true, Ordering::Release);
}

#[no_mangle]
extern "Rust" fn kernel_main() -> ! {
    kernel::boot(|| {
        diag_println!("[BOOT] spawning background thread (priority 2)...");
        let bg = thread::create(background_thread, 0, 4096, 2).expect("spawn background");
        thread::sched_add(bg);

        diag_println!("[BOOT] spawning DMA thread (priority 20)...");
        let hi = thread::create(dma_thread, 0, 4096, 20).expect("spawn dma thread");
        thread::sched_add(hi);

        diag_println!("[BOOT] starting scheduler");
    })
}

fn background_thread(_arg: usize) {
    let mut counter: u64 = 0;
    loop {
        counter = counter.wrapping_add(1);
        if counter % 2_000_000 == 0 {
            diag_println!("[BG] still idling, counter = {}", counter);
        }
        core::hint::spin_loop();
    }
}

fn dma_thread(_arg: usize) {
    let src = SRC.as_ptr() as usize;
    let dst = core::ptr::addr_of_mut!(DST) as usize;

    diag_println!("[DMA] submitting {}-byte transfer", SRC.len());
    dma::submit(dst, src, SRC.len(), on_dma_complete, 0).expect("dma submit");

    while !DMA_DONE.load(Ordering::Acquire) {
        dma::poll();
        preemptive_kernel_core::yield_now();
    }

    let matches = unsafe { DST } == SRC;
    diag_println!("[DMA] round-trip match: {}", matches);
    thread::exit();
}
