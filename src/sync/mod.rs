//! Locking primitives: raw exclusive-monitor spinlock, the preempt-safe
//! (and IRQ-save) spinlock built on it, the priority-inheriting mutex, and
//! the counting semaphore.

pub mod mutex;
pub mod raw_spinlock;
pub mod semaphore;
pub mod spinlock;

pub use mutex::{Mutex, MutexId};
pub use raw_spinlock::RawSpinlock;
pub use semaphore::{Semaphore, SemaphoreId};
pub use spinlock::{SpinGuard, Spinlock};
