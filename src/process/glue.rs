//! Process/thread glue
//!
//! Each process in this core runs exactly one thread, so there is no
//! separate thread control block: the process table below carries
//! everything `curproc_getas`/`curproc_setas`/`proc_create_runprogram`/
//! `proc_destroy` need. A single "current process" pid stands in for the
//! per-CPU current-process pointer a real scheduler would maintain; this
//! core targets one logical CPU, so one slot is enough.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::config::PID_NULL;
use crate::error::KernelResult;
use crate::mm::AddressSpace;
use crate::process::pid;

struct Process {
    name: String,
    addrspace: Option<AddressSpace>,
}

static PROCESSES: Mutex<BTreeMap<u32, Process>> = Mutex::new(BTreeMap::new());
static CURRENT_PID: AtomicU32 = AtomicU32::new(PID_NULL);

fn current() -> Option<u32> {
    let pid = CURRENT_PID.load(Ordering::Acquire);
    if pid == PID_NULL {
        None
    } else {
        Some(pid)
    }
}

/// Create a new process as a child of the currently running one (or as the
/// root process, if none is running yet), assign it a pid, register it in
/// the table, and make it current. Mirrors `proc_create_runprogram`
/// assigning a pid via the registry as part of process creation.
pub fn proc_create_runprogram(name: &str) -> KernelResult<u32> {
    let parent = current().unwrap_or(PID_NULL);
    let new_pid = pid::create(parent)?;
    PROCESSES
        .lock()
        .insert(new_pid, Process { name: String::from(name), addrspace: None });
    CURRENT_PID.store(new_pid, Ordering::Release);
    Ok(new_pid)
}

/// Register `addrspace` under a freshly allocated pid without disturbing
/// which process is current. Used by `fork` to hand the child a table
/// entry of its own while the parent keeps running.
pub fn register_child(parent: u32, name: &str, addrspace: AddressSpace) -> KernelResult<u32> {
    let child_pid = pid::create(parent)?;
    PROCESSES
        .lock()
        .insert(child_pid, Process { name: String::from(name), addrspace: Some(addrspace) });
    Ok(child_pid)
}

/// Drop `pid`'s table entry entirely, returning its address space (if it
/// still had one) so the caller can destroy it.
pub fn proc_destroy(pid: u32) -> Option<AddressSpace> {
    let process = PROCESSES.lock().remove(&pid)?;
    if current() == Some(pid) {
        CURRENT_PID.store(PID_NULL, Ordering::Release);
    }
    process.addrspace
}

/// This process has no more threads to run; a single-thread-per-process
/// core has nothing further to remove here, but the call site in `_exit`
/// stays to mirror where `proc_remthread` runs in the original sequence.
pub fn proc_remthread(_pid: u32) {}

/// The pid of the currently running process, if any.
pub fn curproc_pid() -> Option<u32> {
    current()
}

/// Take the current process's address space, leaving it `None`.
pub fn curproc_getas() -> Option<AddressSpace> {
    let pid = current()?;
    PROCESSES.lock().get_mut(&pid).and_then(|p| p.addrspace.take())
}

/// Install `addrspace` as the current process's address space, returning
/// whatever was there before.
pub fn curproc_setas(addrspace: Option<AddressSpace>) -> Option<AddressSpace> {
    let pid = current()?;
    PROCESSES
        .lock()
        .get_mut(&pid)
        .and_then(|p| core::mem::replace(&mut p.addrspace, addrspace))
}

/// Call `f` with a reference to the current process's address space
/// without taking it. Returns `None` if there is no current process, or
/// the current process has no address space installed yet — the two
/// conditions a TLB refill must treat as `EFAULT` before it can even ask
/// `AddressSpace::handle_fault` anything.
pub fn curproc_with_as<T>(f: impl FnOnce(&AddressSpace) -> T) -> Option<T> {
    let pid = current()?;
    let processes = PROCESSES.lock();
    let as_ref = processes.get(&pid)?.addrspace.as_ref()?;
    Some(f(as_ref))
}

/// Build an independent copy of the current process's address space
/// without disturbing it, for `fork`.
pub fn curproc_copy_as<R: crate::hal::RamSource + 'static>(
    allocator: &crate::mm::FrameAllocator<R>,
) -> Option<KernelResult<AddressSpace>> {
    let pid = current()?;
    PROCESSES.lock().get(&pid).and_then(|p| p.addrspace.as_ref().map(|a| a.copy(allocator)))
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    PROCESSES.lock().clear();
    CURRENT_PID.store(PID_NULL, Ordering::Release);
}
