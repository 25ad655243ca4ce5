//! Process management
//!
//! Ties the pid registry ([`pid`], C3) to the process/thread glue
//! ([`glue`], C4) that tracks which process is presently running. Each
//! process in this core is single-threaded, so there is no separate
//! thread table to manage alongside it.

pub mod glue;
pub mod pid;

use crate::error::KernelResult;
use crate::hal::loader::ProgramLoader;
use crate::hal::ram::RamSource;
use crate::hal::tlb::Tlb;
use crate::mm::FrameAllocator;
use crate::syscall::process::{build_process_image, ExecImage};

/// Bootstrap the process core: creates the root process (pid 1's parent is
/// [`crate::config::PID_NULL`]) and makes it current.
pub fn init() -> crate::error::KernelResult<u32> {
    let pid = glue::proc_create_runprogram("init")?;
    log::info!(target: "process", "created root process, pid={}", pid);
    Ok(pid)
}

/// Load and run the very first program, the way `init`'s single thread of
/// control starts the whole system off. Shares step 4 onward — address
/// space construction, stack definition, argv marshalling — verbatim with
/// `execv`; it differs only in having no prior address space to swap out
/// or destroy, and in registering a brand new process rather than
/// replacing the image of an already-running one.
pub fn run_program<R: RamSource + 'static>(
    program: &str,
    args: &[&str],
    allocator: &FrameAllocator<R>,
    loader: &dyn ProgramLoader,
    tlb: &Tlb,
) -> KernelResult<ExecImage> {
    let pid = glue::proc_create_runprogram(program)?;
    let image = loader.load(program)?;
    let (new_as, exec_image) = build_process_image(&image, args, allocator, tlb)?;
    glue::curproc_setas(Some(new_as));

    log::info!(target: "process", "started initial program {:?}, pid={}", program, pid);
    Ok(exec_image)
}
