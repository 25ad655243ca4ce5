//! Process syscalls: fork, execv, _exit, waitpid, getpid
//!
//! Each function here takes the external collaborators it needs (RAM
//! source, program loader, thread spawn) as explicit parameters rather
//! than reaching for hidden globals, so tests can substitute
//! deterministic stand-ins for all three.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::PID_NULL;
use crate::error::{KernelError, KernelResult};
use crate::hal::loader::{LoadedProgram, ProgramLoader};
use crate::hal::ram::RamSource;
use crate::hal::thread::ThreadSpawn;
use crate::hal::tlb::Tlb;
use crate::mm::{AddressSpace, FrameAllocator};
use crate::process::{glue, pid};

/// Round `len` up to the nearest multiple of `align`. `align` must be a
/// power of two.
fn round_up(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Word size of an argv pointer on the target machine.
const ARG_WORD_SIZE: usize = 4;
/// Stack alignment every pushed argument and the argv array itself must
/// respect, matching the original's 8-byte rounding.
const ARG_ALIGN: usize = 8;

/// Everything a freshly loaded program needs handed to it at entry: the
/// address to jump to, and the `argc`/`argv`/stack-pointer triple the
/// calling convention expects in registers/the stack at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecImage {
    pub entry: usize,
    pub argc: usize,
    /// User virtual address of the marshalled argv pointer array. Equal to
    /// `stackptr`: the array's own location is simultaneously the new
    /// stack top and the pointer handed to the program as `argv`.
    pub argv: usize,
    pub stackptr: usize,
}

/// Marshal `args` onto the stack region of `as_`, following the same
/// layout `runprogram`/`execv` build on top of: each string copied onto
/// the stack from high addresses downward, 8-byte aligned and NUL
/// terminated, followed by a NULL-terminated array of pointers to those
/// strings, also 8-byte aligned. Returns the final stack pointer, which
/// doubles as the address of the argv array.
fn marshal_argv<R: RamSource + 'static>(
    as_: &AddressSpace,
    args: &[&str],
    mut stackptr: usize,
    allocator: &FrameAllocator<R>,
) -> KernelResult<usize> {
    let mut arg_addrs = Vec::with_capacity(args.len());
    for arg in args {
        let bytes = arg.as_bytes();
        let padded = round_up(bytes.len() + 1, ARG_ALIGN);
        stackptr -= padded;
        let mut buf = vec![0u8; padded];
        buf[..bytes.len()].copy_from_slice(bytes);
        as_.write_stack_bytes(stackptr, &buf, allocator)?;
        arg_addrs.push(stackptr as u32);
    }

    let array_len = (arg_addrs.len() + 1) * ARG_WORD_SIZE;
    let padded_array_len = round_up(array_len, ARG_ALIGN);
    stackptr -= padded_array_len;

    let mut array_buf = vec![0u8; padded_array_len];
    for (i, addr) in arg_addrs.iter().enumerate() {
        array_buf[i * ARG_WORD_SIZE..(i + 1) * ARG_WORD_SIZE].copy_from_slice(&addr.to_ne_bytes());
    }
    as_.write_stack_bytes(stackptr, &array_buf, allocator)?;

    Ok(stackptr)
}

/// Shared tail of `execv` and `run_program`: build a fresh address space
/// from a resolved program image, prepare and load it, define its stack,
/// and marshal `args` onto that stack. Neither caller touches any prior
/// address space here — `execv` swaps and destroys the old one itself once
/// this succeeds, and `run_program` has no prior one to begin with.
pub(crate) fn build_process_image<R: RamSource + 'static>(
    image: &LoadedProgram,
    args: &[&str],
    allocator: &FrameAllocator<R>,
    tlb: &Tlb,
) -> KernelResult<(AddressSpace, ExecImage)> {
    let mut new_as = AddressSpace::create();
    new_as.define_region(image.text.vaddr, image.text.size, image.text.writable)?;
    new_as.define_region(image.data.vaddr, image.data.size, image.data.writable)?;
    new_as.prepare_load(allocator)?;
    new_as.complete_load(tlb);
    let stackptr = new_as.define_stack()?;

    let stackptr = marshal_argv(&new_as, args, stackptr, allocator)?;

    let exec_image = ExecImage { entry: image.entrypoint, argc: args.len(), argv: stackptr, stackptr };
    Ok((new_as, exec_image))
}

/// `getpid()`: the caller's own pid.
pub fn sys_getpid() -> u32 {
    glue::curproc_pid().unwrap_or(PID_NULL)
}

/// `_exit(exitcode)`: tear down the calling process. Never returns to it.
///
/// Order mirrors the original: record the exit with the pid registry
/// first (so a parent blocked in `waitpid` can wake as soon as possible),
/// then deactivate and destroy the address space, then drop the process
/// table entry.
pub fn sys_exit<R: RamSource + 'static>(exit_code: i32, allocator: &FrameAllocator<R>) {
    let pid = glue::curproc_pid().expect("_exit called with no current process");
    pid::exit(pid, exit_code);

    if let Some(mut addrspace) = glue::curproc_getas() {
        addrspace.deactivate();
        addrspace.destroy(allocator);
    }
    glue::proc_remthread(pid);
    glue::proc_destroy(pid);
}

/// `waitpid(pid, &status, options)`: the caller's `options` must be zero.
///
/// The `_MKWAIT_EXIT`-style status encoding used on the wire is modeled
/// directly as the exit code; there are no signals in this core, so the
/// "exited normally" wrapping it upstream performs is a no-op here and is
/// omitted rather than faked.
pub fn sys_waitpid(target_pid: u32, options: u32) -> KernelResult<(u32, i32)> {
    if options != 0 {
        return Err(KernelError::InvalidArgument { name: "options" });
    }
    let caller = glue::curproc_pid().ok_or(KernelError::ProcessNotFound { pid: PID_NULL })?;
    let exit_code = pid::wait(caller, target_pid)?;
    Ok((target_pid, exit_code))
}

/// `fork()`: duplicate the calling process. On success returns the child's
/// pid to the parent. Every step after the address-space copy can fail;
/// each failure path frees exactly what the preceding steps allocated,
/// mirroring the original's `pid_fail`/`proc_destroy` rollback chain.
pub fn sys_fork<R: RamSource + 'static>(
    allocator: &FrameAllocator<R>,
    thread_spawn: &dyn ThreadSpawn,
) -> KernelResult<u32> {
    let parent = glue::curproc_pid().ok_or(KernelError::ProcessNotFound { pid: PID_NULL })?;

    let mut child_as = match glue::curproc_copy_as(allocator) {
        Some(Ok(as_)) => as_,
        Some(Err(e)) => return Err(e),
        None => return Err(KernelError::ProcessNotFound { pid: parent }),
    };

    let child_pid = match glue::register_child(parent, "forked-child", {
        // `register_child` takes ownership of the address space; hand it
        // over only once we know it will actually be kept.
        core::mem::replace(&mut child_as, AddressSpace::create())
    }) {
        Ok(pid) => pid,
        Err(e) => {
            child_as.destroy(allocator);
            return Err(e);
        }
    };

    // The real thread_fork hands the scheduler a copied trapframe to
    // resume into; there is no scheduler here, so the spawn call is a
    // no-op placeholder for where that handoff happens.
    if thread_spawn.spawn("forked-child", no_op_entry, child_pid as usize, 0).is_err() {
        if let Some(mut as_) = glue::proc_destroy(child_pid) {
            as_.destroy(allocator);
        }
        pid::exit(child_pid, 0);
        return Err(KernelError::InvalidState { expected: "thread spawn succeeds", actual: "spawn failed" });
    }

    Ok(child_pid)
}

fn no_op_entry(_arg1: usize, _arg2: usize) {}

/// `execv(program, args)`: replace the calling process's program image.
///
/// Builds and fully prepares the new address space *before* touching the
/// current one. Only once that has entirely succeeded is the old address
/// space swapped out and destroyed; a failure at any earlier point leaves
/// the caller exactly as it was. This is a deliberate departure from
/// swap-then-load: swapping first and discovering the load failed
/// afterward leaves nothing to recover into.
pub fn sys_execv<R: RamSource + 'static>(
    program: &str,
    args: &[&str],
    allocator: &FrameAllocator<R>,
    loader: &dyn ProgramLoader,
    tlb: &Tlb,
) -> KernelResult<ExecImage> {
    if program.is_empty() {
        return Err(KernelError::InvalidArgument { name: "program" });
    }

    let image = loader.load(program)?;
    let (new_as, exec_image) = build_process_image(&image, args, allocator, tlb)?;

    if let Some(mut old_as) = glue::curproc_setas(Some(new_as)) {
        old_as.destroy(allocator);
    }
    tlb.invalidate_all();

    Ok(exec_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::loader::{LoadedProgram, Segment, StaticLoader};
    use crate::hal::ram::StaticRam;
    use crate::hal::thread::SyncSpawn;
    use crate::mm::frame_allocator::FRAME_SIZE;

    static RAM: StaticRam = StaticRam::new(0x10_0000, 0x10_0000 + 256 * FRAME_SIZE);

    const PROGRAMS: &[(&str, LoadedProgram)] = &[(
        "/bin/hello",
        LoadedProgram {
            text: Segment { vaddr: 0x0040_0000, size: FRAME_SIZE, writable: false },
            data: Segment { vaddr: 0x0040_1000, size: FRAME_SIZE, writable: true },
            entrypoint: 0x0040_0000,
        },
    )];

    fn fresh_allocator() -> FrameAllocator<StaticRam> {
        let allocator = FrameAllocator::new(&RAM);
        allocator.bootstrap();
        allocator
    }

    #[test]
    fn getpid_reflects_current_process() {
        glue::reset_for_test();
        let pid = glue::proc_create_runprogram("init").unwrap();
        assert_eq!(sys_getpid(), pid);
    }

    #[test]
    fn exit_then_waitpid_round_trips_status() {
        glue::reset_for_test();
        let parent = glue::proc_create_runprogram("parent").unwrap();
        let child = glue::register_child(parent, "child", AddressSpace::create()).unwrap();

        pid::exit(child, 42);
        let (got_pid, status) = sys_waitpid(child, 0).unwrap();
        assert_eq!(got_pid, child);
        assert_eq!(status, 42);
    }

    #[test]
    fn waitpid_rejects_nonzero_options() {
        glue::reset_for_test();
        glue::proc_create_runprogram("parent").unwrap();
        assert!(matches!(sys_waitpid(1, 1), Err(KernelError::InvalidArgument { .. })));
    }

    #[test]
    fn fork_duplicates_address_space_under_a_new_pid() {
        glue::reset_for_test();
        let allocator = fresh_allocator();
        let spawn = SyncSpawn;
        let parent = glue::proc_create_runprogram("parent").unwrap();

        let mut parent_as = AddressSpace::create();
        parent_as.define_region(0x400000, FRAME_SIZE, false).unwrap();
        parent_as.prepare_load(&allocator).unwrap();
        glue::curproc_setas(Some(parent_as));

        let child = sys_fork(&allocator, &spawn).unwrap();
        assert_ne!(child, parent);
        assert_eq!(sys_getpid(), parent);
    }

    #[test]
    fn execv_success_swaps_address_space() {
        glue::reset_for_test();
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let loader = StaticLoader::new(PROGRAMS);
        glue::proc_create_runprogram("init").unwrap();

        let image = sys_execv("/bin/hello", &[], &allocator, &loader, &tlb).unwrap();
        assert_eq!(image.entry, 0x0040_0000);
        assert_eq!(image.argc, 0);
        assert_eq!(image.argv, image.stackptr);
    }

    #[test]
    fn execv_marshals_argv_onto_the_new_stack() {
        glue::reset_for_test();
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let loader = StaticLoader::new(PROGRAMS);
        glue::proc_create_runprogram("init").unwrap();

        let args = ["hello", "a", "bb"];
        let image = sys_execv("/bin/hello", &args, &allocator, &loader, &tlb).unwrap();
        assert_eq!(image.argc, args.len());
        assert_eq!(image.argv, image.stackptr);

        let new_as = glue::curproc_getas().unwrap();
        let mut array_buf = vec![0u8; (args.len() + 1) * ARG_WORD_SIZE];
        new_as.read_stack_bytes(image.argv, &mut array_buf, &allocator).unwrap();

        for (i, expected) in args.iter().enumerate() {
            let word = u32::from_ne_bytes(array_buf[i * 4..i * 4 + 4].try_into().unwrap());
            let mut str_buf = vec![0u8; expected.len() + 1];
            new_as.read_stack_bytes(word as usize, &mut str_buf, &allocator).unwrap();
            assert_eq!(&str_buf[..expected.len()], expected.as_bytes());
            assert_eq!(str_buf[expected.len()], 0, "argument string must be NUL-terminated");
        }
        let terminator = u32::from_ne_bytes(array_buf[args.len() * 4..(args.len() + 1) * 4].try_into().unwrap());
        assert_eq!(terminator, 0, "argv array must be NULL-terminated");
    }

    #[test]
    fn execv_failure_leaves_old_address_space_intact() {
        glue::reset_for_test();
        let allocator = fresh_allocator();
        let tlb = Tlb::new();
        let loader = StaticLoader::new(PROGRAMS);
        glue::proc_create_runprogram("init").unwrap();

        let mut original = AddressSpace::create();
        original.define_region(0x500000, FRAME_SIZE, false).unwrap();
        original.prepare_load(&allocator).unwrap();
        glue::curproc_setas(Some(original));

        assert!(sys_execv("/bin/missing", &[], &allocator, &loader, &tlb).is_err());
        assert!(glue::curproc_getas().is_some());
    }
}
