//! Memory management
//!
//! Physical frames ([`frame_allocator`]) and per-process virtual address
//! spaces ([`addrspace`]) built on top of them. Machine RAM and the TLB are
//! both represented through the [`crate::hal`] seam rather than owned
//! here.

pub mod addrspace;
pub mod frame_allocator;

use crate::error::{KernelError, KernelResult};
use crate::hal::ram::StaticRam;
use crate::hal::tlb::{FaultType, Tlb};
use crate::process::glue;

pub use addrspace::AddressSpace;
pub use frame_allocator::{FrameAllocator, FrameNumber, PhysicalAddress, FRAME_SIZE};

/// Flat RAM region backing every frame this core ever hands out.
/// A teaching machine's memory map is small and fixed at link time.
static RAM: StaticRam = StaticRam::new(0x0000_0000, 0x0080_0000);

/// The global frame allocator, bootstrapped once during [`init`].
pub static FRAME_ALLOCATOR: FrameAllocator<StaticRam> = FrameAllocator::new(&RAM);

/// The global machine TLB.
pub static TLB: Tlb = Tlb::new();

/// Bootstrap the frame allocator over the RAM region above. Must run
/// exactly once, before any address space is created.
pub fn init() {
    FRAME_ALLOCATOR.bootstrap();
    log::info!(target: "mm", "frame allocator bootstrapped, {} pages free", FRAME_ALLOCATOR.free_count());
}

/// Top-level TLB refill entry point. Resolves which address space is
/// current before handing off to [`AddressSpace::handle_fault`]: a fault
/// with no current process, or a current process with no address space
/// installed yet, is `EFAULT` rather than something `handle_fault` itself
/// could ever be asked to classify.
pub fn handle_tlb_fault(faultaddress: usize, fault_type: FaultType, tlb: &Tlb) -> KernelResult<()> {
    glue::curproc_pid().ok_or(KernelError::InvalidAddress { addr: faultaddress })?;
    glue::curproc_with_as(|as_| as_.handle_fault(faultaddress, fault_type, tlb))
        .ok_or(KernelError::InvalidAddress { addr: faultaddress })?
}
