//! Bare exclusive-monitor spinlock: a single word, no embedded data, no
//! preempt-disable of its own. [`super::spinlock::Spinlock`] is built on
//! top of this for anything that actually needs to protect data.

use core::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A single lock word touched only through exclusive-monitor instructions.
pub struct RawSpinlock {
    word: AtomicU32,
}

impl RawSpinlock {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(UNLOCKED),
        }
    }

    /// Attempt to acquire without spinning. `ldaxr`/`stxr` on real
    /// hardware; `compare_exchange` captures the same acquire-on-success
    /// semantics on the host.
    #[cfg(target_arch = "aarch64")]
    pub fn try_lock(&self) -> bool {
        let addr = &self.word as *const AtomicU32 as *mut u32;
        let success: u32;
        unsafe {
            core::arch::asm!(
                "ldaxr {old:w}, [{addr}]",
                "cbnz {old:w}, 2f",
                "stxr {res:w}, {one:w}, [{addr}]",
                "b 3f",
                "2:",
                "clrex",
                "mov {res:w}, #1",
                "3:",
                addr = in(reg) addr,
                old = out(reg) _,
                res = out(reg) success,
                one = in(reg) LOCKED,
                options(nostack),
            );
        }
        success == 0
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub fn try_lock(&self) -> bool {
        self.word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until acquired, yielding between attempts.
    pub fn lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            while self.word.load(Ordering::Relaxed) != UNLOCKED {
                cpu_relax();
            }
        }
    }

    /// Store-release of zero.
    pub fn unlock(&self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Relaxed) != UNLOCKED
    }
}

impl Default for RawSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Sync for RawSpinlock {}

#[cfg(target_arch = "aarch64")]
fn cpu_relax() {
    unsafe { core::arch::asm!("yield", options(nomem, nostack)) };
}

#[cfg(not(target_arch = "aarch64"))]
fn cpu_relax() {
    core::hint::spin_loop();
}
