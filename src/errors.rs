//! Typed error hierarchy for the kernel core.
//!
//! Every fallible operation returns a `KernelResult<T>`. Fatal, unrecoverable
//! conditions (stack-guard mismatch, lockdep cycle, reentrant IRQ misuse) are
//! *not* represented here — they log a diagnostic and halt the CPU, so they
//! are plain `-> !` functions instead.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level error type for all kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Spawn(SpawnError),
    Mutex(MutexError),
    Dma(DmaError),
    Mmu(MmuError),
    Sched(SchedError),
}

/// Errors that can occur while creating a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Stack size was zero or not a multiple of 16.
    InvalidStackSize(usize),
    /// Base priority exceeded the valid range (0..=31).
    InvalidPriority(u8),
    /// The stack arena has no room left.
    StackArenaExhausted,
    /// The thread arena has no room left.
    ThreadArenaExhausted,
}

/// Errors returned by `Mutex::unlock` / `Mutex::try_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexError {
    /// `unlock` called by a thread that is not the current owner.
    NotOwner,
    /// `try_lock` found the mutex already held by another thread.
    WouldBlock,
}

/// Errors returned by `Dma::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// A zero address or zero length was supplied.
    InvalidArgument,
    /// The descriptor arena has no room left.
    ArenaExhausted,
}

/// Errors returned by the MMU scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuError {
    /// `init(true)` was called a second time.
    AlreadyEnabled,
    /// The address does not fall within a mapped region.
    UnmappedAddress(usize),
}

/// Errors returned by scheduler bookkeeping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The referenced thread id is not present in the kernel's thread arena.
    UnknownThread,
    /// The runqueue was empty when a thread was required.
    NoRunnableThread,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Spawn(e) => write!(f, "spawn error: {}", e),
            KernelError::Mutex(e) => write!(f, "mutex error: {}", e),
            KernelError::Dma(e) => write!(f, "dma error: {}", e),
            KernelError::Mmu(e) => write!(f, "mmu error: {}", e),
            KernelError::Sched(e) => write!(f, "scheduler error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::InvalidStackSize(n) => write!(f, "invalid stack size: {}", n),
            SpawnError::InvalidPriority(p) => write!(f, "invalid priority: {}", p),
            SpawnError::StackArenaExhausted => write!(f, "stack arena exhausted"),
            SpawnError::ThreadArenaExhausted => write!(f, "thread arena exhausted"),
        }
    }
}

impl fmt::Display for MutexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexError::NotOwner => write!(f, "unlock called by non-owner"),
            MutexError::WouldBlock => write!(f, "mutex already held"),
        }
    }
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmaError::InvalidArgument => write!(f, "invalid dma argument"),
            DmaError::ArenaExhausted => write!(f, "dma descriptor arena exhausted"),
        }
    }
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmuError::AlreadyEnabled => write!(f, "mmu already enabled"),
            MmuError::UnmappedAddress(a) => write!(f, "address {:#x} not mapped", a),
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::UnknownThread => write!(f, "unknown thread id"),
            SchedError::NoRunnableThread => write!(f, "no runnable thread"),
        }
    }
}

impl From<SpawnError> for KernelError {
    fn from(e: SpawnError) -> Self {
        KernelError::Spawn(e)
    }
}

impl From<MutexError> for KernelError {
    fn from(e: MutexError) -> Self {
        KernelError::Mutex(e)
    }
}

impl From<DmaError> for KernelError {
    fn from(e: DmaError) -> Self {
        KernelError::Dma(e)
    }
}

impl From<MmuError> for KernelError {
    fn from(e: MmuError) -> Self {
        KernelError::Mmu(e)
    }
}

impl From<SchedError> for KernelError {
    fn from(e: SchedError) -> Self {
        KernelError::Sched(e)
    }
}
