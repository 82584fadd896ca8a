//! Deadlock lab: two threads acquire a pair of mutexes in opposite order
//! (thread 1 takes A then B, thread 2 takes B then A). With `lockdep` off
//! both threads end up BLOCKED on each other forever; with it on, the
//! second out-of-order `lock()` call detects the cycle and halts before
//! either thread actually deadlocks.
//!
//! # Building
//!
//! ```bash
//! # lockdep off: watch both threads park on each other
//! cargo build --release --features "qemu-virt lab-deadlock" --target aarch64-unknown-none
//! # lockdep on: the cycle is caught before it forms
//! cargo build --release --features "qemu-virt lab-deadlock lockdep" --target aarch64-unknown-none
//! ```
//!
//! # Running
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 512M \
//!     -kernel target/aarch64-unknown-none/release/examples/lab_deadlock \
//!     -nographic
//! ```
//!
//! Press Ctrl-A X to exit QEMU.

#![no_std]
#![no_main]
#![cfg(feature = "lab-deadlock")]

use core::cell::Cell;

use preemptive_kernel_core::{diag_println, kernel, sync::mutex, thread};

// Both lab threads need both mutex ids; `thread::create`'s entry point only
// carries a single `usize` argument, so the second id is stashed here
// rather than packed into `arg`.
struct MutexIds {
    a: Cell<mutex::MutexId>,
    b: Cell<mutex::MutexId>,
}
unsafe impl Sync for MutexIds {}

static IDS: MutexIds = MutexIds {
    a: Cell::new(mutex::MutexId(0)),
    b: Cell::new(mutex::MutexId(0)),
};

#[no_mangle]
extern "Rust" fn kernel_main() -> ! {
    kernel::boot(|| {
        let a = mutex::create(false).expect("create mutex a");
        let b = mutex::create(false).expect("create mutex b");
        IDS.a.set(a);
        IDS.b.set(b);

        diag_println!("[BOOT] spawning thread 1 (locks A then B)...");
        let t1 = thread::create(thread_one, 0, 4096, 10).expect("spawn thread 1");
        thread::sched_add(t1);

        diag_println!("[BOOT] spawning thread 2 (locks B then A)...");
        let t2 = thread::create(thread_two, 0, 4096, 10).expect("spawn thread 2");
        thread::sched_add(t2);

        diag_println!("[BOOT] starting scheduler");
    })
}

fn thread_one(_arg: usize) {
    let (a, b) = (IDS.a.get(), IDS.b.get());
    diag_println!("[T1] locking A");
    mutex::lock(a);
    diag_println!("[T1] locked A, spinning to give T2 a chance to take B");
    for _ in 0..20_000 {
        core::hint::spin_loop();
    }
    diag_println!("[T1] locking B");
    mutex::lock(b);
    diag_println!("[T1] locked both, releasing");
    mutex::unlock(b).expect("t1 owns b");
    mutex::unlock(a).expect("t1 owns a");
    thread::exit();
}

fn thread_two(_arg: usize) {
    let (a, b) = (IDS.a.get(), IDS.b.get());
    diag_println!("[T2] locking B");
    mutex::lock(b);
    diag_println!("[T2] locked B, spinning to give T1 a chance to take A");
    for _ in 0..20_000 {
        core::hint::spin_loop();
    }
    diag_println!("[T2] locking A");
    mutex::lock(a);
    diag_println!("[T2] locked both, releasing -- no deadlock occurred");
    mutex::unlock(a).expect("t2 owns a");
    mutex::unlock(b).expect("t2 owns b");
    thread::exit();
}
