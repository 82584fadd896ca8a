//! Stack-overflow lab: a thread recurses past its stack's guard region.
//! The next timer tick's guard check (§4.N) catches the corrupted magic
//! and halts with a diagnostic naming the offending thread, instead of
//! letting the recursion walk into whatever memory follows the stack.
//!
//! # Building
//!
//! ```bash
//! cargo build --release --features "qemu-virt lab-stack-overflow" --target aarch64-unknown-none
//! ```
//!
//! # Running
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 512M \
//!     -kernel target/aarch64-unknown-none/release/examples/lab_stack_overflow \
//!     -nographic
//! ```
//!
//! Press Ctrl-A X to exit QEMU.

#![no_std]
#![no_main]
#![cfg(feature = "lab-stack-overflow")]

use preemptive_kernel_core::{diag_println, kernel, thread};

#[no_mangle]
extern "Rust" fn kernel_main() -> ! {
    kernel::boot(|| {
        diag_println!("[BOOT] spawning a thread with a deliberately small stack...");
        // 256 bytes leaves almost nothing past the 64-byte guard region;
        // a handful of recursive frames is enough to stomp it.
        let t = thread::create(recurse_forever, 0, 256, 10).expect("spawn overflowing thread");
        thread::sched_add(t);

        diag_println!("[BOOT] starting scheduler, watch for the guard-corruption halt");
    })
}

fn recurse_forever(arg: usize) {
    // Prevent the compiler from turning this into a loop: each call must
    // push a fresh frame to actually consume stack.
    let mut buf = [0u8; 64];
    buf[arg % 64] = arg as u8;
    core::hint::black_box(&buf);
    recurse_forever(arg.wrapping_add(1));
}
