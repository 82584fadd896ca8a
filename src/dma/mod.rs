//! Non-coherent DMA engine: a FIFO descriptor queue plus the explicit
//! cache maintenance that makes it safe to hand buffers to a device that
//! doesn't snoop the CPU's data cache (§4.L).
//!
//! Descriptors are bump-allocated from a dedicated arena and never freed
//! (§3: "the arena is sized for the workload"), mirroring
//! [`crate::mem::boot_alloc::Arena`] — but this arena additionally threads
//! a FIFO through its slots, so it keeps its own bump index rather than
//! reusing that generic type directly.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::barriers::{dc_cvac_range, dc_ivac_range, dma_rmb, dma_wmb};
use crate::arch::irqflags;
use crate::errors::{DmaError, KernelResult};
use crate::mem::memops;
use crate::mmu;

/// Maximum live descriptors. Generous for the round-trip lengths §8 item
/// 10 exercises (1, 63, 64, 65, 4096 bytes) run back to back.
pub const MAX_DESCRIPTORS: usize = 64;

/// Completion callback: `(user_cookie, status)`. Invoked with `status = 0`
/// exactly once, from [`poll`].
pub type Callback = fn(usize, i32);

/// Index into the descriptor arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaId(usize);

struct Descriptor {
    src: Cell<usize>,
    dst: Cell<usize>,
    len: Cell<usize>,
    status: Cell<u8>,
    callback: Cell<Option<Callback>>,
    user: Cell<usize>,
    next: Cell<Option<DmaId>>,
}

unsafe impl Sync for Descriptor {}

impl Descriptor {
    const fn new() -> Self {
        Self {
            src: Cell::new(0),
            dst: Cell::new(0),
            len: Cell::new(0),
            status: Cell::new(0),
            callback: Cell::new(None),
            user: Cell::new(0),
            next: Cell::new(None),
        }
    }

    fn addr(&self) -> usize {
        self as *const Descriptor as usize
    }

    fn size() -> usize {
        core::mem::size_of::<Descriptor>()
    }
}

const NEW_DESCRIPTOR: Descriptor = Descriptor::new();
static ARENA: [Descriptor; MAX_DESCRIPTORS] = [NEW_DESCRIPTOR; MAX_DESCRIPTORS];
static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

static HEAD: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(usize::MAX);
static TAIL: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(usize::MAX);

const NONE_SLOT: usize = usize::MAX;

fn slot(id: DmaId) -> &'static Descriptor {
    &ARENA[id.0]
}

fn claim() -> Option<DmaId> {
    loop {
        let cur = NEXT_SLOT.load(Ordering::Relaxed);
        if cur >= MAX_DESCRIPTORS {
            return None;
        }
        if NEXT_SLOT
            .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return Some(DmaId(cur));
        }
    }
}

/// Submit a memcpy-shaped transfer. Validates arguments, clears the
/// descriptor for device visibility, then links it onto the tail of the
/// FIFO under `irqsave` (§5: "DMA queue fix-ups are done under irqsave" —
/// [`poll`] may run from a driver's IRQ tail, not just thread context).
pub fn submit(dst: usize, src: usize, len: usize, callback: Callback, user: usize) -> KernelResult<DmaId> {
    if dst == 0 || src == 0 || len == 0 {
        return Err(DmaError::InvalidArgument.into());
    }

    let id = claim().ok_or(DmaError::ArenaExhausted)?;
    let d = slot(id);
    d.src.set(src);
    d.dst.set(dst);
    d.len.set(len);
    d.callback.set(Some(callback));
    d.user.set(user);
    d.next.set(None);
    d.status.set(1);

    // Prepare for device: make the source buffer and the descriptor
    // itself visible to the non-coherent device view before either is
    // reachable through the queue.
    dc_cvac_range(src, len);
    dma_wmb();
    dc_cvac_range(d.addr(), Descriptor::size());

    let flags = irqflags::local_irq_save();
    let prev_tail = TAIL.load(Ordering::Relaxed);
    TAIL.store(id.0, Ordering::Relaxed);
    if prev_tail == NONE_SLOT {
        HEAD.store(id.0, Ordering::Relaxed);
    } else {
        slot(DmaId(prev_tail)).next.set(Some(id));
    }
    irqflags::local_irq_restore(flags);

    if prev_tail != NONE_SLOT {
        // The previous tail's `next` pointer must be visible to the device
        // before this descriptor becomes reachable from the head.
        dc_cvac_range(slot(DmaId(prev_tail)).addr(), Descriptor::size());
    }

    Ok(id)
}

/// Drain the FIFO, performing each transfer and completing it. Returns the
/// number of descriptors processed.
pub fn poll() -> usize {
    let mut processed = 0;
    loop {
        let flags = irqflags::local_irq_save();
        let head = HEAD.load(Ordering::Relaxed);
        if head == NONE_SLOT {
            irqflags::local_irq_restore(flags);
            break;
        }
        let d = slot(DmaId(head));
        if d.status.get() != 1 {
            irqflags::local_irq_restore(flags);
            break;
        }
        let next = d.next.get();
        HEAD.store(next.map_or(NONE_SLOT, |n| n.0), Ordering::Relaxed);
        if next.is_none() {
            TAIL.store(NONE_SLOT, Ordering::Relaxed);
        }
        irqflags::local_irq_restore(flags);

        complete(d);
        processed += 1;
    }
    processed
}

#[cfg(feature = "dma-nc-alias")]
fn complete(d: &Descriptor) {
    let (src, dst, len) = (d.src.get(), d.dst.get(), d.len.get());
    let nc_src = mmu::nc_alias_for(src);
    let nc_dst = mmu::nc_alias_for(dst);
    unsafe { memops::memcpy(nc_dst as *mut u8, nc_src as *const u8, len) };
    finish(d, dst, len);
}

#[cfg(not(feature = "dma-nc-alias"))]
fn complete(d: &Descriptor) {
    let (src, dst, len) = (d.src.get(), d.dst.get(), d.len.get());
    unsafe { memops::memcpy(dst as *mut u8, src as *const u8, len) };
    dc_cvac_range(dst, len);
    finish(d, dst, len);
}

fn finish(d: &Descriptor, dst: usize, len: usize) {
    dma_rmb();
    dc_ivac_range(dst, len);
    d.status.set(0);
    dc_cvac_range(d.addr(), Descriptor::size());
    if let Some(cb) = d.callback.get() {
        cb(d.user.get(), 0);
    }
}

pub fn status(id: DmaId) -> u8 {
    slot(id).status.get()
}
