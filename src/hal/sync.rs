//! Blocking rendezvous
//!
//! `pid::wait` and `Intersection::before_entry` both need to suspend a
//! caller until some other thread changes shared state, then have that
//! thread wake them back up. The lock/condition-variable/semaphore surface
//! behind that is an external collaborator this core assumes exists rather
//! than implements, same as the console, the loader, or the TLB; this is
//! the seam for it.

pub trait Blocker: Sync {
    /// Suspend the calling thread until the next `notify_all`, or until an
    /// internal timeout elapses. Callers re-check their own condition
    /// under their own lock after this returns, so a spurious or delayed
    /// wakeup is harmless — it only costs an extra poll.
    fn wait(&self);

    /// Wake every thread currently suspended in `wait`.
    fn notify_all(&self);
}

#[cfg(not(target_os = "none"))]
extern crate std;

/// Real blocking implementation backed by a host mutex and condition
/// variable. `wait` uses a bounded timeout rather than an unbounded one:
/// the mutex guarding this `Condvar` is not the same lock the caller polls
/// its own condition under, so a `notify_all` between that check and this
/// call would otherwise be lost until something else happens to wake us.
/// Twenty milliseconds caps the cost of that race instead of hanging.
#[cfg(not(target_os = "none"))]
pub struct CondvarBlocker {
    mutex: std::sync::Mutex<()>,
    cv: std::sync::Condvar,
}

#[cfg(not(target_os = "none"))]
impl CondvarBlocker {
    pub const fn new() -> Self {
        Self { mutex: std::sync::Mutex::new(()), cv: std::sync::Condvar::new() }
    }
}

#[cfg(not(target_os = "none"))]
impl Default for CondvarBlocker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "none"))]
impl Blocker for CondvarBlocker {
    fn wait(&self) {
        let guard = self.mutex.lock().unwrap_or_else(|e| e.into_inner());
        let _ = self
            .cv
            .wait_timeout(guard, std::time::Duration::from_millis(20))
            .unwrap_or_else(|e| e.into_inner());
    }

    fn notify_all(&self) {
        self.cv.notify_all();
    }
}

/// Deterministic test double: never actually suspends, never wakes anyone.
/// Also the bare-metal fallback where there is no host thread scheduler to
/// park on.
pub struct SpinBlocker;

impl SpinBlocker {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for SpinBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl Blocker for SpinBlocker {
    fn wait(&self) {
        core::hint::spin_loop();
    }

    fn notify_all(&self) {}
}

#[cfg(not(target_os = "none"))]
pub type DefaultBlocker = CondvarBlocker;
#[cfg(target_os = "none")]
pub type DefaultBlocker = SpinBlocker;
