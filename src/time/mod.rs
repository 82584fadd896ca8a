//! Monotonic time and the tick counter that drives scheduling decisions.

use portable_atomic::{AtomicU64, Ordering};

/// Nanoseconds since an implementation-defined epoch (the generic timer's
/// reset), used only for diagnostics — scheduling itself runs off the raw
/// tick count, not wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64);

impl Instant {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Current time, read from the ARM generic timer (`cntpct_el0` /
    /// `cntfrq_el0`). Returns zero on non-aarch64 hosts.
    pub fn now() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            let cnt: u64;
            let freq: u64;
            unsafe {
                core::arch::asm!("mrs {0}, cntpct_el0", out(reg) cnt, options(nostack, nomem, preserves_flags));
                core::arch::asm!("mrs {0}, cntfrq_el0", out(reg) freq, options(nostack, nomem, preserves_flags));
            }
            let nanos = if freq > 0 {
                ((cnt as u128 * 1_000_000_000) / freq as u128) as u64
            } else {
                0
            };
            Self(nanos)
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            Self(0)
        }
    }

    pub fn duration_since(self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Self;
    fn add(self, duration: Duration) -> Self {
        Self(self.0 + duration.as_nanos())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Duration {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }
    pub fn from_micros(micros: u64) -> Self {
        Self(micros * 1_000)
    }
    pub fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }
    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

/// Ticks observed since boot, incremented from `tick()`. Mirrors
/// `CpuLocal::ticks` but is readable without reaching into `arch::cpu_local`
/// from modules that only care about elapsed ticks (diagnostics, tests).
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Called once per timer interrupt. Advances the tick counter and runs the
/// scheduler's tick handler (`sched_on_tick`), per §6: "the core calls
/// `sched_on_tick()` from inside `on_irq()`".
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    crate::arch::cpu_local::cpu_local()
        .ticks
        .fetch_add(1, Ordering::Relaxed);
    crate::sched::sched_on_tick();
}

/// A periodic interrupt source driving [`tick`]. External collaborator:
/// register-level programming lives in an implementation (e.g.
/// [`GenericTimer`]), this crate only defines the contract and the tick
/// callback it triggers.
pub trait Timer: Send + Sync {
    /// Program the timer to fire at `hz` and unmask it.
    fn init_hz(&self, hz: u32);

    /// Called from the IRQ handler when this timer's interrupt fires.
    /// Reprograms the next expiry, then calls [`tick`].
    fn on_irq(&self) {
        tick();
    }
}

/// ARM generic timer (`CNTV_TVAL_EL0`/`CNTV_CTL_EL0`), driving the virtual
/// timer PPI. Grounded in the reference implementation's `timer_init_hz`/
/// `timer_irq`.
pub struct GenericTimer;

impl GenericTimer {
    fn read_cntfrq() -> u64 {
        #[cfg(target_arch = "aarch64")]
        {
            let freq: u64;
            unsafe {
                core::arch::asm!("mrs {0}, cntfrq_el0", out(reg) freq, options(nostack, nomem, preserves_flags));
            }
            freq
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            0
        }
    }

    fn reload_ticks(hz: u32) -> u64 {
        let freq = Self::read_cntfrq();
        if hz == 0 || freq == 0 {
            return 1;
        }
        (freq / hz as u64).max(1)
    }
}

impl Timer for GenericTimer {
    fn init_hz(&self, hz: u32) {
        if hz == 0 {
            return;
        }
        let reload = Self::reload_ticks(hz);
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("msr cntv_ctl_el0, {0}", in(reg) 0u64, options(nostack, nomem));
            core::arch::asm!("msr cntv_tval_el0, {0}", in(reg) reload, options(nostack, nomem));
            core::arch::asm!("msr cntv_ctl_el0, {0}", in(reg) 1u64, options(nostack, nomem));
            core::arch::asm!("isb", options(nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "aarch64"))]
        let _ = reload;
    }

    fn on_irq(&self) {
        let reload = Self::reload_ticks(1000);
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("msr cntv_tval_el0, {0}", in(reg) reload, options(nostack, nomem));
        }
        #[cfg(not(target_arch = "aarch64"))]
        let _ = reload;
        tick();
    }
}

pub const TIMER_FREQUENCY_HZ: u32 = 1000;
