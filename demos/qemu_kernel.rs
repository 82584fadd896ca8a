//! Round-robin scheduling demo: two busy-looping threads, preempted
//! automatically by the timer tick rather than yielding cooperatively.
//!
//! Built with the default `sched-rr` policy — each thread gets an equal
//! quantum ([`preemptive_kernel_core::thread::QUANTUM`] ticks) regardless
//! of its base priority.
//!
//! # Building
//!
//! ```bash
//! cargo build --release --features qemu-virt --target aarch64-unknown-none
//! ```
//!
//! # Running
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 512M \
//!     -kernel target/aarch64-unknown-none/release/examples/qemu_kernel \
//!     -nographic
//! ```
//!
//! Press Ctrl-A X to exit QEMU.

#![no_std]
#![no_main]

use preemptive_kernel_core::{diag_println, kernel, thread};

#[no_mangle]
extern "Rust" fn kernel_main() -> ! {
    kernel::boot(|| {
        diag_println!();
        diag_println!("========================================");
        diag_println!("  preemptive-kernel-core: round-robin demo");
        diag_println!("========================================");
        diag_println!();

        diag_println!("[BOOT] spawning thread 1...");
        let t1 = thread::create(busy_thread_one, 0, 4096, 10).expect("spawn thread 1");
        thread::sched_add(t1);

        diag_println!("[BOOT] spawning thread 2...");
        let t2 = thread::create(busy_thread_two, 0, 4096, 10).expect("spawn thread 2");
        thread::sched_add(t2);

        diag_println!("[BOOT] starting scheduler, timer preemption takes over from here");
    })
}

fn busy_thread_one(_arg: usize) {
    let mut counter: u64 = 0;
    loop {
        counter = counter.wrapping_add(1);
        if counter % 1_000_000 == 0 {
            diag_println!("[T1] counter = {}", counter);
        }
        core::hint::spin_loop();
    }
}

fn busy_thread_two(_arg: usize) {
    let mut counter: u64 = 0;
    loop {
        counter = counter.wrapping_add(1);
        if counter % 1_000_000 == 0 {
            diag_println!("[T2] counter = {}", counter);
        }
        core::hint::spin_loop();
    }
}
