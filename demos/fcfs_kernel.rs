//! Strict-priority rotation demo: three equal-priority threads, each
//! getting one quantum in turn, FIFO-within-priority — the closest analog
//! under this scheduler to a first-come-first-served rotation. Requires
//! the `sched-prio` feature; under `sched-rr` the same three threads
//! rotate for the same reason (equal priority plays no part there either).
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
//!     -kernel target/aarch64-unknown-none/release/examples/fcfs_kernel \
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
        diag_println!("  preemptive-kernel-core: rotation demo");
        diag_println!("========================================");
        diag_println!();

        diag_println!("[BOOT] spawning 3 equal-priority threads...");
        let t1 = thread::create(worker_one, 0, 4096, 10).expect("spawn thread 1");
        thread::sched_add(t1);
        let t2 = thread::create(worker_two, 0, 4096, 10).expect("spawn thread 2");
        thread::sched_add(t2);
        let t3 = thread::create(worker_three, 0, 4096, 10).expect("spawn thread 3");
        thread::sched_add(t3);

        diag_println!("[BOOT] starting scheduler - each thread runs one quantum in turn");
        diag_println!();
    })
}

fn worker_one(_arg: usize) {
    diag_println!("[T1] started");
    loop {
        for i in 0..5 {
            diag_println!("[T1] count: {}", i);
        }
        preemptive_kernel_core::yield_now();
    }
}

fn worker_two(_arg: usize) {
    diag_println!("[T2] started");
    loop {
        for i in 0..5 {
            diag_println!("[T2] count: {}", i);
        }
        preemptive_kernel_core::yield_now();
    }
}

fn worker_three(_arg: usize) {
    diag_println!("[T3] started");
    loop {
        for i in 0..5 {
            diag_println!("[T3] count: {}", i);
        }
        preemptive_kernel_core::yield_now();
    }
}
