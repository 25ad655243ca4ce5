//! System call interface
//!
//! The dispatcher covers exactly the five syscalls this core implements:
//! `fork`, `execv`, `_exit`, `waitpid`, `getpid`. Each one is a thin
//! argument-unmarshalling wrapper around [`process`]; the real logic lives
//! there so it can be unit tested without going through numbered syscall
//! dispatch at all.

pub mod process;

use crate::error::KernelError;
use crate::hal::loader::ProgramLoader;
use crate::hal::ram::RamSource;
use crate::hal::thread::ThreadSpawn;
use crate::hal::tlb::Tlb;
use crate::mm::FrameAllocator;

/// System call numbers this core's ABI exposes.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork = 0,
    Execv = 1,
    Exit = 2,
    Waitpid = 3,
    Getpid = 4,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Syscall::Fork),
            1 => Ok(Syscall::Execv),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Waitpid),
            4 => Ok(Syscall::Getpid),
            _ => Err(()),
        }
    }
}

/// The external collaborators the dispatcher threads through to the
/// syscalls that need them, gathered in one place so call sites don't
/// have to name all three every time.
pub struct SyscallContext<'a, R: RamSource + 'static> {
    pub allocator: &'a FrameAllocator<R>,
    pub loader: &'a dyn ProgramLoader,
    pub thread_spawn: &'a dyn ThreadSpawn,
    pub tlb: &'a Tlb,
}

/// Dispatch a numbered syscall, returning a raw return value on success or
/// a negative errno on failure, matching the convention of the syscalls
/// this core's ancestor exposes.
pub fn dispatch<R: RamSource + 'static>(
    syscall: Syscall,
    ctx: &SyscallContext<'_, R>,
    arg1: usize,
    arg2: usize,
) -> isize {
    let result: Result<isize, KernelError> = match syscall {
        Syscall::Fork => process::sys_fork(ctx.allocator, ctx.thread_spawn).map(|pid| pid as isize),
        Syscall::Execv => {
            // In a real ABI, arg1/arg2 are user pointers to the path and
            // argv array that would first be copied into kernel buffers;
            // that marshalling belongs to the trap-entry layer, not here.
            let _ = (arg1, arg2);
            Err(KernelError::Unimplemented { operation: "execv argument marshalling" })
        }
        Syscall::Exit => {
            process::sys_exit(arg1 as i32, ctx.allocator);
            Ok(0)
        }
        Syscall::Waitpid => process::sys_waitpid(arg1 as u32, arg2 as u32)
            .map(|(pid, status)| ((pid as isize) << 32) | (status as isize & 0xffff_ffff)),
        Syscall::Getpid => Ok(process::sys_getpid() as isize),
    };

    match result {
        Ok(value) => value,
        Err(e) => -(e.to_errno() as isize),
    }
}
