//! Process and memory core for a small MIPS-style teaching kernel
//!
//! Covers the physical frame allocator, per-process address spaces, the
//! pid registry, process/thread glue, the five-syscall process ABI, and
//! the intersection admission-control primitive. Everything this core
//! assumes exists around it — trap entry, the scheduler, the VFS and ELF
//! loader, the raw machine TLB — is represented behind the [`hal`] seam
//! rather than implemented here.

#![no_std]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

// Host target: delegate to the system allocator so tests can use Vec/String
// without a real kernel heap behind them.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

pub mod config;
pub mod error;
pub mod hal;
pub mod log_service;
pub mod log_setup;
pub mod mm;
pub mod process;
pub mod sync;
pub mod syscall;

/// Bring the core up: bootstrap the frame allocator, then the root
/// process. Call once, before any syscall is dispatched.
pub fn bootstrap() -> error::KernelResult<()> {
    log_setup::init(log::LevelFilter::Trace);
    mm::init();
    process::init()?;
    Ok(())
}

/// Heap allocation error handler.
///
/// Panic is intentional: heap allocation failure in a no_std kernel is
/// unrecoverable. The alloc_error_handler ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}
