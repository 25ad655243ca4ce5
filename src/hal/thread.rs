//! Thread spawn
//!
//! `fork`'s last step hands a freshly copied address space and a trap frame
//! to the scheduler and asks it to start running a new kernel thread at a
//! given entry point. The scheduler itself — run queues, preemption,
//! priorities — is out of scope; this trait is only the handoff.

use crate::error::KernelResult;

/// An entry function a spawned thread begins executing at, taking the two
/// `unsigned long` style arguments the real `thread_fork` passes through.
pub type ThreadEntry = fn(usize, usize);

/// Starts new kernel threads. The real implementation context-switches into
/// one; a single-CPU teaching core without a scheduler can run it to
/// completion synchronously and still satisfy every caller in this crate,
/// since nothing here depends on concurrent thread execution.
pub trait ThreadSpawn: Sync {
    fn spawn(&self, name: &'static str, entry: ThreadEntry, arg1: usize, arg2: usize) -> KernelResult<()>;
}

/// Runs the entry function immediately, synchronously, on the caller's
/// stack. Good enough for a single-threaded-per-process core: nothing in
/// C1-C6 requires the new thread to run concurrently with its parent.
pub struct SyncSpawn;

impl ThreadSpawn for SyncSpawn {
    fn spawn(&self, _name: &'static str, entry: ThreadEntry, arg1: usize, arg2: usize) -> KernelResult<()> {
        entry(arg1, arg2);
        Ok(())
    }
}

/// Records entry/argument triples instead of running them, for tests that
/// want to assert a spawn happened without it actually executing.
pub struct RecordingSpawn {
    pub calls: spin::Mutex<alloc::vec::Vec<(&'static str, usize, usize)>>,
}

impl RecordingSpawn {
    pub const fn new() -> Self {
        Self { calls: spin::Mutex::new(alloc::vec::Vec::new()) }
    }
}

impl ThreadSpawn for RecordingSpawn {
    fn spawn(&self, name: &'static str, _entry: ThreadEntry, arg1: usize, arg2: usize) -> KernelResult<()> {
        self.calls.lock().push((name, arg1, arg2));
        Ok(())
    }
}
