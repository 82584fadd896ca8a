//! Boot-sequence glue (§6 "Boot contract").
//!
//! There is no separate `Kernel<A, S>` struct duplicating state here: the
//! runqueue, per-CPU block, mutex/semaphore/thread arenas, DMA queue, and
//! MMU region table already live behind their own static inside
//! `sched`/`arch::cpu_local`/`sync`/`thread`/`dma`/`mmu` respectively. Per
//! the Design Notes ("global mutable state ... is legitimate here"), this
//! module is just the one place that calls them in the right order —
//! the single top-level kernel object the spec asks for is these modules
//! taken together, not a struct that re-holds their fields.
//!
//! By the time `_start` (`arch::aarch64_boot`) reaches [`boot`], the vector
//! table is installed, the GICv3 is initialized, and the per-CPU IRQ stack
//! is recorded — everything this module still has to do is: bring up the
//! diagnostic UART, build the MMU's region table, let the caller spawn its
//! threads, arm the timer, unmask IRQs, and hand off to the scheduler.

use crate::arch::DefaultArch;
use crate::arch::Arch;
use crate::time::{GenericTimer, Timer, TIMER_FREQUENCY_HZ};

#[cfg(target_arch = "aarch64")]
use crate::arch::uart::install as install_uart;
#[cfg(target_arch = "aarch64")]
use crate::arch::uart_pl011::Pl011;

#[cfg(target_arch = "aarch64")]
static UART: Pl011 = Pl011;
static TIMER: GenericTimer = GenericTimer;

/// Run the boot sequence and start the scheduler. `setup` runs once the
/// MMU scaffold is built but before interrupts are unmasked — the
/// caller's only chance to `thread::create` + `thread::sched_add` the
/// kernel's initial threads before [`crate::sched::sched_start`] needs one
/// to jump to. Never returns: a genuine return from `sched_start` is a
/// fatal programming error (§7) and halts instead.
#[cfg(target_arch = "aarch64")]
pub fn boot(setup: impl FnOnce()) -> ! {
    unsafe {
        Pl011::init();
    }
    install_uart(&UART);

    // `qemu-virt` builds run under QEMU's `virt` machine, whose emulated
    // RAM backs the MMU's non-cacheable alias uniformly, so the DMA
    // engine is free to use it; real hardware builds leave translation
    // off and fall back to the cacheable-view-plus-clean path.
    let _ = crate::mmu::init(cfg!(feature = "qemu-virt"));

    setup();

    TIMER.init_hz(TIMER_FREQUENCY_HZ);
    DefaultArch::enable_interrupts();

    crate::sched::sched_start();
}

/// Host stand-in for [`boot`]. The `std-shim` test harness drives
/// `thread`/`sched`/`sync` bookkeeping directly rather than through a real
/// boot sequence (see `src/tests`), so this exists only so the crate
/// type-checks on a non-aarch64 host; it is never exercised by a test.
#[cfg(not(target_arch = "aarch64"))]
pub fn boot(setup: impl FnOnce()) -> ! {
    let _ = crate::mmu::init(false);
    setup();
    TIMER.init_hz(TIMER_FREQUENCY_HZ);
    DefaultArch::enable_interrupts();
    crate::sched::sched_start();
}
