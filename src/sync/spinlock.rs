//! Preempt-safe spinlock wrapping arbitrary data, in the style of
//! `spin::Mutex`'s guard (the crate already depends on `spin`, but its
//! guard type doesn't coordinate with this kernel's preempt counter, so
//! this type exists alongside it rather than wrapping it).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use super::raw_spinlock::RawSpinlock;
use crate::arch::irqflags::{self, IrqFlags};
use crate::preempt::{preempt_disable, preempt_enable};

pub struct Spinlock<T> {
    raw: RawSpinlock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawSpinlock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire, keeping preemption disabled for the guard's lifetime. A
    /// thread spinning on the raw word stays preemptible between attempts,
    /// so a single CPU can still make progress while this lock is held.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        loop {
            preempt_disable();
            if self.raw.try_lock() {
                return SpinGuard {
                    lock: self,
                    irq_flags: None,
                };
            }
            preempt_enable();
            while self.raw.is_locked() {
                core::hint::spin_loop();
            }
        }
    }

    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        preempt_disable();
        if self.raw.try_lock() {
            Some(SpinGuard {
                lock: self,
                irq_flags: None,
            })
        } else {
            preempt_enable();
            None
        }
    }

    /// Acquire with local IRQs masked first. Required for any lock also
    /// touched from IRQ context (the runqueue, the DMA queue, per-CPU
    /// counters) so the IRQ handler can never reenter a section the thread
    /// path is already inside.
    pub fn lock_irqsave(&self) -> SpinGuard<'_, T> {
        loop {
            let flags = irqflags::local_irq_save();
            preempt_disable();
            if self.raw.try_lock() {
                return SpinGuard {
                    lock: self,
                    irq_flags: Some(flags),
                };
            }
            preempt_enable();
            irqflags::local_irq_restore(flags);
            while self.raw.is_locked() {
                core::hint::spin_loop();
            }
        }
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a Spinlock<T>,
    irq_flags: Option<IrqFlags>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
        if let Some(flags) = self.irq_flags {
            irqflags::local_irq_restore(flags);
        }
        preempt_enable();
    }
}
