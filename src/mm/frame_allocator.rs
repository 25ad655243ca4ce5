//! Physical frame allocator
//!
//! Before the core map exists, frames are handed out by stealing linearly
//! from the top of RAM via [`crate::hal::RamSource`]. Once bootstrapped,
//! the core map itself lives in frames carved out of that same range, and
//! every later allocation is a first-fit linear scan over it: find the
//! first run of `npages` consecutive available entries, mark it
//! unavailable, and record how many pages the run spans so `free` can
//! release the whole run from just its first frame number.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::hal::RamSource;

/// Size of a physical page, re-exported for callers that used to reach for
/// the allocator module directly for this constant.
pub const FRAME_SIZE: usize = PAGE_SIZE;

/// Physical frame number (a page-granularity index, not a byte address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(num: usize) -> Self {
        Self(num)
    }

    pub const fn as_usize(&self) -> usize {
        self.0
    }

    pub const fn as_addr(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * FRAME_SIZE)
    }
}

/// Physical memory address, byte granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(usize);

impl PhysicalAddress {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(&self) -> usize {
        self.0
    }

    pub const fn as_frame(&self) -> FrameNumber {
        FrameNumber::new(self.0 / FRAME_SIZE)
    }
}

/// One core map slot. `available` entries are free; an occupied run's first
/// entry carries the run's length in `npages` so a single-frame `free`
/// call can release the whole run. Non-first entries of an occupied run
/// carry `npages = 0` and are never looked at directly.
#[derive(Debug, Clone, Copy)]
struct CoreMapEntry {
    available: bool,
    npages: usize,
}

const EMPTY_ENTRY: CoreMapEntry = CoreMapEntry { available: true, npages: 0 };

/// Upper bound on the number of frames a single build of this core will
/// ever track. A teaching kernel's RAM is small and fixed at boot; a
/// growable core map would need heap allocation before the heap exists.
const MAX_FRAMES: usize = 8192;

struct CoreMap {
    entries: [CoreMapEntry; MAX_FRAMES],
    /// Number of frames actually backed by RAM; entries past this index
    /// are unused padding.
    len: usize,
    /// Physical address of frame 0, for converting frame numbers back to
    /// addresses.
    base: usize,
}

/// The physical frame allocator: a bump allocator before bootstrap, a
/// first-fit core map scan after.
pub struct FrameAllocator<R: RamSource + 'static> {
    ram: &'static R,
    core_map: Mutex<Option<CoreMap>>,
    free_frames: AtomicUsize,
}

impl<R: RamSource + 'static> FrameAllocator<R> {
    pub const fn new(ram: &'static R) -> Self {
        Self {
            ram,
            core_map: Mutex::new(None),
            free_frames: AtomicUsize::new(0),
        }
    }

    /// Build the core map over the remaining, not-yet-stolen RAM. Must run
    /// once, after any pre-bootstrap `steal`-based allocations (e.g. for
    /// the core map's own backing storage) are done. Allocations before
    /// this call go straight through [`RamSource::steal`]; allocations
    /// after it go through the core map.
    pub fn bootstrap(&self) {
        let (_, top) = self.ram.bounds();
        let cursor = self
            .ram
            .steal(0)
            .unwrap_or(top);
        let npages = (top - cursor) / PAGE_SIZE;
        let npages = npages.min(MAX_FRAMES);

        let mut entries = [EMPTY_ENTRY; MAX_FRAMES];
        for entry in entries.iter_mut().take(npages) {
            *entry = CoreMapEntry { available: true, npages: 0 };
        }

        *self.core_map.lock() = Some(CoreMap { entries, len: npages, base: cursor });
        self.free_frames.store(npages, Ordering::Release);
    }

    /// Allocate `npages` contiguous pages, returning the physical address
    /// of the first. Before [`Self::bootstrap`] this steals raw RAM
    /// directly; a bump allocation has no matching free, mirroring the
    /// pre-coremap allocator it is grounded on.
    pub fn alloc(&self, npages: usize) -> KernelResult<PhysicalAddress> {
        if npages == 0 {
            return Err(KernelError::InvalidArgument { name: "npages" });
        }

        let mut guard = self.core_map.lock();
        let Some(core_map) = guard.as_mut() else {
            drop(guard);
            return self
                .ram
                .steal(npages)
                .map(PhysicalAddress::new)
                .ok_or(KernelError::OutOfMemory { requested: npages * PAGE_SIZE, available: 0 });
        };

        let mut run_start = None;
        let mut run_len = 0;
        for i in 0..core_map.len {
            if core_map.entries[i].available {
                if run_len == 0 {
                    run_start = Some(i);
                }
                run_len += 1;
                if run_len == npages {
                    let start = run_start.unwrap();
                    core_map.entries[start].npages = npages;
                    for entry in &mut core_map.entries[start..start + npages] {
                        entry.available = false;
                    }
                    self.free_frames.fetch_sub(npages, Ordering::AcqRel);
                    return Ok(PhysicalAddress::new(core_map.base + start * PAGE_SIZE));
                }
            } else {
                run_len = 0;
            }
        }

        Err(KernelError::OutOfMemory {
            requested: npages * PAGE_SIZE,
            available: self.free_frames.load(Ordering::Acquire) * PAGE_SIZE,
        })
    }

    /// Release a run previously returned by [`Self::alloc`]. `addr` must be
    /// the exact address `alloc` returned, not an interior page of the run.
    ///
    /// A no-op before [`Self::bootstrap`]: pre-bootstrap allocations came
    /// from the bump allocator, which never supported freeing, so there is
    /// nothing here to reclaim.
    pub fn free(&self, addr: PhysicalAddress) {
        let mut guard = self.core_map.lock();
        let Some(core_map) = guard.as_mut() else {
            return;
        };

        let offset = addr.as_usize() - core_map.base;
        assert_eq!(offset % PAGE_SIZE, 0, "free() address is not frame-aligned");
        let start = offset / PAGE_SIZE;
        let npages = core_map.entries[start].npages;
        assert!(npages > 0, "free() called on an already-free or interior frame");

        for entry in &mut core_map.entries[start..start + npages] {
            entry.available = true;
            entry.npages = 0;
        }
        self.free_frames.fetch_add(npages, Ordering::AcqRel);
    }

    /// Number of pages currently available. Only meaningful after
    /// bootstrap; reports 0 before it since the bump allocator tracks no
    /// such count.
    pub fn free_count(&self) -> usize {
        self.free_frames.load(Ordering::Acquire)
    }

    /// Zero `len` bytes of physical memory starting at `addr`.
    pub fn zero(&self, addr: PhysicalAddress, len: usize) {
        self.ram.zero_bytes(addr.as_usize(), len);
    }

    /// Copy `data` into physical memory starting at `addr`.
    pub fn write(&self, addr: PhysicalAddress, data: &[u8]) {
        self.ram.write_bytes(addr.as_usize(), data);
    }

    /// Copy `buf.len()` bytes of physical memory starting at `addr` into `buf`.
    pub fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) {
        self.ram.read_bytes(addr.as_usize(), buf);
    }
}
