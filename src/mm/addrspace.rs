//! Per-process address space
//!
//! An address space owns at most two loadable regions — conventionally
//! text and data, though nothing here cares which is which beyond
//! write-permission — plus a fixed-size stack. Unlike a demand-paged VM,
//! every page a region owns is allocated up front by
//! [`AddressSpace::prepare_load`]; the fault handler below only ever
//! installs a TLB entry for a page that already has a backing frame, it
//! never allocates one.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::{NUM_STACK_PAGES, PAGE_SIZE, USERSTACK};
use crate::error::{KernelError, KernelResult};
use crate::hal::ram::RamSource;
use crate::hal::tlb::{FaultType, InterruptGuard, Tlb};
use crate::mm::frame_allocator::{FrameAllocator, PhysicalAddress};

fn page_align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

fn page_align_up(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A single loadable region: a virtual base, a page count, and the
/// physical frame backing each page once `prepare_load` has run.
struct Region {
    vbase: usize,
    npages: usize,
    writable: bool,
    frames: Vec<Option<PhysicalAddress>>,
}

impl Region {
    fn contains(&self, vaddr: usize) -> bool {
        vaddr >= self.vbase && vaddr < self.vbase + self.npages * PAGE_SIZE
    }

    fn frame_for(&self, vaddr: usize) -> Option<PhysicalAddress> {
        let index = (vaddr - self.vbase) / PAGE_SIZE;
        self.frames.get(index).copied().flatten()
    }
}

/// Which segment a fault address classified into, needed to decide whether
/// the installed TLB entry should come back read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Text,
    Data,
    Stack,
}

/// A process's virtual address space: up to two regions plus a stack.
pub struct AddressSpace {
    text: Option<Region>,
    data: Option<Region>,
    stack: Vec<Option<PhysicalAddress>>,
    /// Set once `complete_load` has run. Text pages become read-only the
    /// instant this flips, mirroring `load_elf_completed` gating the DIRTY
    /// bit in the original refill handler.
    load_elf_completed: bool,
    prepared: bool,
}

impl AddressSpace {
    pub fn create() -> Self {
        Self {
            text: None,
            data: None,
            stack: Vec::new(),
            load_elf_completed: false,
            prepared: false,
        }
    }

    /// Define the first region as text, the second as data. A third call
    /// is rejected: this core, like its ancestor, only ever loads one text
    /// and one data segment per program.
    pub fn define_region(&mut self, vaddr: usize, size: usize, writable: bool) -> KernelResult<()> {
        let vbase = page_align_down(vaddr);
        let npages = page_align_up(size + (vaddr - vbase)) / PAGE_SIZE;
        let region = Region { vbase, npages, writable, frames: Vec::new() };

        if self.text.is_none() {
            self.text = Some(region);
        } else if self.data.is_none() {
            self.data = Some(region);
        } else {
            return Err(KernelError::TooManyRegions);
        }
        Ok(())
    }

    /// Allocate a physical frame for every page of every region, plus the
    /// fixed-size stack. May only run once per address space; the upstream
    /// function this is grounded on is deliberately "misused" later by
    /// `copy` for the same reason — it is the only place frames get handed
    /// out to an address space.
    pub fn prepare_load<R: RamSource + 'static>(&mut self, allocator: &FrameAllocator<R>) -> KernelResult<()> {
        assert!(!self.prepared, "prepare_load called twice on the same address space");

        if let Some(region) = self.text.as_mut() {
            region.frames = alloc_pages(allocator, region.npages)?;
        }
        if let Some(region) = self.data.as_mut() {
            region.frames = alloc_pages(allocator, region.npages)?;
        }
        self.stack = alloc_pages(allocator, NUM_STACK_PAGES)?;

        self.prepared = true;
        self.load_elf_completed = false;
        Ok(())
    }

    /// Mark the load finished: from now on, faults against the text region
    /// come back read-only.
    pub fn complete_load(&mut self, tlb: &Tlb) {
        tlb.invalidate_all();
        self.load_elf_completed = true;
    }

    /// Return the initial stack pointer for a freshly loaded program.
    pub fn define_stack(&self) -> KernelResult<usize> {
        if self.stack.is_empty() {
            return Err(KernelError::InvalidState {
                expected: "prepare_load already ran",
                actual: "stack not yet allocated",
            });
        }
        Ok(USERSTACK)
    }

    /// Build a fresh, independently-backed copy of this address space:
    /// same region layout, freshly allocated frames, same bytes. Every
    /// frame the copy receives is a byte-for-byte duplicate of the
    /// corresponding frame here, so the two address spaces can diverge
    /// afterward without either seeing the other's writes.
    pub fn copy<R: RamSource + 'static>(&self, allocator: &FrameAllocator<R>) -> KernelResult<AddressSpace> {
        let mut new_as = AddressSpace::create();
        if let Some(region) = &self.text {
            new_as.text = Some(Region {
                vbase: region.vbase,
                npages: region.npages,
                writable: region.writable,
                frames: Vec::new(),
            });
        }
        if let Some(region) = &self.data {
            new_as.data = Some(Region {
                vbase: region.vbase,
                npages: region.npages,
                writable: region.writable,
                frames: Vec::new(),
            });
        }

        new_as.prepare_load(allocator)?;

        copy_region_bytes(&self.text, &new_as.text, allocator);
        copy_region_bytes(&self.data, &new_as.data, allocator);
        copy_pages_bytes(&self.stack, &new_as.stack, allocator);

        Ok(new_as)
    }

    /// Copy `data` onto the stack region starting at user virtual address
    /// `vaddr`, straddling page boundaries as needed. Used by the syscall
    /// layer to marshal argv onto a freshly defined stack.
    pub fn write_stack_bytes<R: RamSource + 'static>(
        &self,
        vaddr: usize,
        data: &[u8],
        allocator: &FrameAllocator<R>,
    ) -> KernelResult<()> {
        let mut cursor = 0;
        self.for_each_stack_chunk(vaddr, data.len(), |frame, page_offset, chunk_len| {
            allocator.write(PhysicalAddress::new(frame.as_usize() + page_offset), &data[cursor..cursor + chunk_len]);
            cursor += chunk_len;
            Ok(())
        })
    }

    /// Read `buf.len()` bytes off the stack region starting at user virtual
    /// address `vaddr`. The inverse of [`Self::write_stack_bytes`].
    pub fn read_stack_bytes<R: RamSource + 'static>(
        &self,
        vaddr: usize,
        buf: &mut [u8],
        allocator: &FrameAllocator<R>,
    ) -> KernelResult<()> {
        let mut cursor = 0;
        self.for_each_stack_chunk(vaddr, buf.len(), |frame, page_offset, chunk_len| {
            allocator.read(PhysicalAddress::new(frame.as_usize() + page_offset), &mut buf[cursor..cursor + chunk_len]);
            cursor += chunk_len;
            Ok(())
        })
    }

    /// Walk the stack frames spanned by `[vaddr, vaddr + len)`, calling `f`
    /// once per page-aligned chunk with the backing frame, the offset into
    /// that frame, and the chunk length.
    fn for_each_stack_chunk(
        &self,
        vaddr: usize,
        len: usize,
        mut f: impl FnMut(PhysicalAddress, usize, usize) -> KernelResult<()>,
    ) -> KernelResult<()> {
        let stack_base = USERSTACK - NUM_STACK_PAGES * PAGE_SIZE;
        let mut offset = 0;
        while offset < len {
            let addr = vaddr + offset;
            if addr < stack_base || addr >= USERSTACK {
                return Err(KernelError::InvalidAddress { addr });
            }
            let index = (addr - stack_base) / PAGE_SIZE;
            let frame = self.stack.get(index).copied().flatten().ok_or(KernelError::InvalidAddress { addr })?;
            let page_offset = addr % PAGE_SIZE;
            let chunk_len = (len - offset).min(PAGE_SIZE - page_offset);
            f(frame, page_offset, chunk_len)?;
            offset += chunk_len;
        }
        Ok(())
    }

    /// Return every frame this address space owns to the allocator.
    pub fn destroy<R: RamSource + 'static>(&mut self, allocator: &FrameAllocator<R>) {
        for region in [&self.text, &self.data].into_iter().flatten() {
            for frame in region.frames.iter().flatten() {
                allocator.free(*frame);
            }
        }
        for frame in self.stack.iter().flatten() {
            allocator.free(*frame);
        }
        self.text = None;
        self.data = None;
        self.stack.clear();
    }

    /// Invalidate every TLB entry. Called whenever this address space
    /// becomes the running one, since stale entries might belong to a
    /// different address space that happened to reuse the same vpn range.
    pub fn activate(&self, tlb: &Tlb) {
        tlb.invalidate_all();
    }

    /// No hardware state needs saving when an address space stops running;
    /// the next `activate` invalidates the TLB regardless of what is in it.
    pub fn deactivate(&self) {}

    /// The TLB refill fault handler: classify the faulting address,
    /// resolve it to an already-allocated physical frame, and install a
    /// translation. Runs with interrupts disabled because the probe-for-
    /// an-invalid-slot-then-write sequence must not be interleaved with
    /// another fault on this CPU.
    pub fn handle_fault(&self, faultaddress: usize, fault_type: FaultType, tlb: &Tlb) -> KernelResult<()> {
        if fault_type == FaultType::ReadOnly {
            return Err(KernelError::ReadOnlyFault { addr: faultaddress });
        }
        if fault_type != FaultType::Read && fault_type != FaultType::Write {
            return Err(KernelError::InvalidFaultType);
        }

        let faultaddress = page_align_down(faultaddress);

        let (paddr, kind) = if let Some(region) = self.text.as_ref().filter(|r| r.contains(faultaddress)) {
            (region.frame_for(faultaddress), SegmentKind::Text)
        } else if let Some(region) = self.data.as_ref().filter(|r| r.contains(faultaddress)) {
            (region.frame_for(faultaddress), SegmentKind::Data)
        } else if faultaddress >= USERSTACK - NUM_STACK_PAGES * PAGE_SIZE && faultaddress < USERSTACK {
            let index = (faultaddress - (USERSTACK - NUM_STACK_PAGES * PAGE_SIZE)) / PAGE_SIZE;
            (self.stack.get(index).copied().flatten(), SegmentKind::Stack)
        } else {
            return Err(KernelError::InvalidAddress { addr: faultaddress });
        };

        let paddr = paddr.ok_or(KernelError::InvalidAddress { addr: faultaddress })?;

        let _guard = InterruptGuard::disable();
        let dirty = !(self.load_elf_completed && kind == SegmentKind::Text);
        tlb.install(faultaddress, paddr.as_usize(), dirty);
        Ok(())
    }
}

fn alloc_pages<R: RamSource + 'static>(
    allocator: &FrameAllocator<R>,
    npages: usize,
) -> KernelResult<Vec<Option<PhysicalAddress>>> {
    let mut frames = vec![None; npages];
    for slot in frames.iter_mut() {
        let frame = allocator.alloc(1)?;
        allocator.zero(frame, PAGE_SIZE);
        *slot = Some(frame);
    }
    Ok(frames)
}

/// Copy every frame in `src` to the corresponding frame in `dst`, in order.
/// Both slices are expected to be the same length and shape, since they
/// come from a region and its freshly `prepare_load`ed copy.
fn copy_pages_bytes<R: RamSource + 'static>(
    src: &[Option<PhysicalAddress>],
    dst: &[Option<PhysicalAddress>],
    allocator: &FrameAllocator<R>,
) {
    let mut buf = [0u8; PAGE_SIZE];
    for (s, d) in src.iter().zip(dst.iter()) {
        if let (Some(s), Some(d)) = (s, d) {
            allocator.read(*s, &mut buf);
            allocator.write(*d, &buf);
        }
    }
}

fn copy_region_bytes<R: RamSource + 'static>(src: &Option<Region>, dst: &Option<Region>, allocator: &FrameAllocator<R>) {
    if let (Some(src), Some(dst)) = (src, dst) {
        copy_pages_bytes(&src.frames, &dst.frames, allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ram::StaticRam;

    static RAM: StaticRam = StaticRam::new(0x1000, 0x1000 + 64 * PAGE_SIZE);

    fn fresh_allocator() -> FrameAllocator<StaticRam> {
        let allocator = FrameAllocator::new(&RAM);
        allocator.bootstrap();
        allocator
    }

    #[test]
    fn define_region_rejects_a_third_call() {
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.define_region(0x401000, PAGE_SIZE, true).unwrap();
        assert!(as_.define_region(0x402000, PAGE_SIZE, true).is_err());
    }

    #[test]
    fn fault_resolves_text_page_after_prepare_load() {
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();

        as_.handle_fault(0x400000, FaultType::Read, &tlb).unwrap();
        assert!(tlb.lookup(0x400000).is_some());
    }

    #[test]
    fn text_becomes_read_only_after_complete_load() {
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();
        as_.complete_load(&tlb);

        as_.handle_fault(0x400000, FaultType::Read, &tlb).unwrap();
        let (_, dirty) = tlb.lookup(0x400000).unwrap();
        assert!(!dirty);
    }

    #[test]
    fn fault_outside_any_region_is_invalid_address() {
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();

        assert!(as_.handle_fault(0x1000, FaultType::Read, &tlb).is_err());
    }

    #[test]
    fn readonly_fault_type_is_always_rejected() {
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();

        assert!(as_.handle_fault(0x400000, FaultType::ReadOnly, &tlb).is_err());
    }

    #[test]
    fn copy_allocates_independent_frames() {
        let allocator = fresh_allocator();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.define_region(0x500000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&allocator).unwrap();

        let copy = as_.copy(&allocator).unwrap();
        let original_frame = as_.text.as_ref().unwrap().frames[0].unwrap();
        let copy_frame = copy.text.as_ref().unwrap().frames[0].unwrap();
        assert_ne!(original_frame.as_usize(), copy_frame.as_usize());
    }

    #[test]
    fn destroy_frees_every_owned_frame() {
        let allocator = fresh_allocator();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();
        let before = allocator.free_count();

        as_.destroy(&allocator);
        assert_eq!(allocator.free_count(), before + 1 + NUM_STACK_PAGES);
    }

    #[test]
    fn prepare_load_zeroes_every_allocated_frame() {
        let allocator = fresh_allocator();
        let frame = allocator.alloc(1).unwrap();
        allocator.write(frame, &[0xff; 16]);
        allocator.free(frame);

        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, false).unwrap();
        as_.prepare_load(&allocator).unwrap();

        let mut buf = [0u8; 16];
        allocator.read(as_.text.as_ref().unwrap().frames[0].unwrap(), &mut buf);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn copy_duplicates_frame_contents_not_just_layout() {
        let allocator = fresh_allocator();
        let mut as_ = AddressSpace::create();
        as_.define_region(0x400000, PAGE_SIZE, true).unwrap();
        as_.prepare_load(&allocator).unwrap();

        let original_frame = as_.text.as_ref().unwrap().frames[0].unwrap();
        allocator.write(original_frame, b"hello from the parent");

        let copy = as_.copy(&allocator).unwrap();
        let copy_frame = copy.text.as_ref().unwrap().frames[0].unwrap();
        assert_ne!(original_frame.as_usize(), copy_frame.as_usize());

        let mut buf = [0u8; 21];
        allocator.read(copy_frame, &mut buf);
        assert_eq!(&buf, b"hello from the parent");

        // Independent frames: writing to the original must not leak into
        // the copy.
        allocator.write(original_frame, b"mutated after fork----");
        allocator.read(copy_frame, &mut buf);
        assert_eq!(&buf, b"hello from the parent");
    }

    #[test]
    fn stack_bytes_round_trip_across_a_page_boundary() {
        let allocator = fresh_allocator();
        let mut as_ = AddressSpace::create();
        as_.prepare_load(&allocator).unwrap();

        let boundary = USERSTACK - PAGE_SIZE - 4;
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        as_.write_stack_bytes(boundary, &data, &allocator).unwrap();

        let mut out = [0u8; 8];
        as_.read_stack_bytes(boundary, &mut out, &allocator).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn stack_bytes_outside_the_stack_region_is_invalid_address() {
        let allocator = fresh_allocator();
        let mut as_ = AddressSpace::create();
        as_.prepare_load(&allocator).unwrap();

        assert!(as_.write_stack_bytes(0x1000, &[1, 2, 3], &allocator).is_err());
    }
}
