//! Priority-inversion lab: a low-priority thread takes a shared mutex, a
//! mid-priority thread keeps the CPU busy with no interest in the mutex at
//! all, and a high-priority thread blocks on it. Without priority
//! inheritance the mid-priority thread can starve the low-priority owner
//! indefinitely, so the high-priority thread never gets the mutex either —
//! the owner's priority never catches up to the one-hop, much less the
//! waiter it's actually blocking.
//!
//! Build with `priority-inheritance` disabled to watch the inversion (the
//! mid-priority thread dominates the log); with it enabled (the crate
//! default) the low-priority owner is lifted to the high-priority waiter's
//! level as soon as it blocks, finishes quickly, and hands off.
//!
//! # Building
//!
//! ```bash
//! cargo build --release --features "qemu-virt lab-priority-inversion" --target aarch64-unknown-none
//! cargo build --release --no-default-features --features "qemu-virt lab-priority-inversion sched-rr" --target aarch64-unknown-none
//! ```
//!
//! # Running
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 512M \
//!     -kernel target/aarch64-unknown-none/release/examples/lab_priority_inversion \
//!     -nographic
//! ```
//!
//! Press Ctrl-A X to exit QEMU.

#![no_std]
#![no_main]
#![cfg(feature = "lab-priority-inversion")]

use core::sync::atomic::{AtomicBool, Ordering};

use preemptive_kernel_core::{diag_println, kernel, sync::mutex, thread};

static SHARED: AtomicBool = AtomicBool::new(false);
static HIGH_GOT_IT: AtomicBool = AtomicBool::new(false);

#[no_mangle]
extern "Rust" fn kernel_main() -> ! {
    kernel::boot(|| {
        let shared = mutex::create(cfg!(feature = "priority-inheritance")).expect("create mutex");

        diag_println!("[BOOT] spawning low-priority owner (priority 2)...");
        let low = thread::create(low_priority_owner, shared.0, 4096, 2).expect("spawn low");
        thread::sched_add(low);

        diag_println!("[BOOT] spawning mid-priority hog (priority 10)...");
        let mid = thread::create(mid_priority_hog, 0, 4096, 10).expect("spawn mid");
        thread::sched_add(mid);

        diag_println!("[BOOT] spawning high-priority waiter (priority 20)...");
        let high = thread::create(high_priority_waiter, shared.0, 4096, 20).expect("spawn high");
        thread::sched_add(high);

        diag_println!("[BOOT] starting scheduler");
    })
}

fn low_priority_owner(arg: usize) {
    let shared = mutex::MutexId(arg);
    mutex::lock(shared);
    diag_println!("[LOW] acquired shared mutex, doing a little work");
    for _ in 0..50_000 {
        core::hint::spin_loop();
    }
    diag_println!("[LOW] releasing shared mutex");
    mutex::unlock(shared).expect("low owns the mutex");
    SHARED.store(true, Ordering::Release);
    thread::exit();
}

fn mid_priority_hog(_arg: usize) {
    let mut counter: u64 = 0;
    loop {
        counter = counter.wrapping_add(1);
        if counter % 5_000_000 == 0 {
            diag_println!("[MID] burning cycles, counter = {}", counter);
        }
        if HIGH_GOT_IT.load(Ordering::Acquire) {
            diag_println!("[MID] high-priority thread got the mutex, stepping aside");
            thread::exit();
        }
        core::hint::spin_loop();
    }
}

fn high_priority_waiter(arg: usize) {
    let shared = mutex::MutexId(arg);
    diag_println!("[HIGH] blocking on shared mutex");
    mutex::lock(shared);
    diag_println!("[HIGH] acquired shared mutex");
    mutex::unlock(shared).expect("high owns the mutex");
    HIGH_GOT_IT.store(true, Ordering::Release);
    thread::exit();
}
