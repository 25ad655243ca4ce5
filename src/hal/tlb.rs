//! Machine TLB
//!
//! Models the 64-entry software-managed TLB assumed by the fault handler:
//! each slot holds a virtual page number and, if valid, the mapped physical
//! frame plus VALID/DIRTY bits. "Write-at-index" and "write-at-random" are
//! the two hardware primitives the refill handler is built on; there is no
//! real silicon behind this in a teaching core, so the struct below plays
//! both the production role and the test double.

use bitflags::bitflags;
use spin::Mutex;

use crate::config::{NUM_TLB_ENTRIES, PAGE_SIZE};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlbFlags: u8 {
        const VALID = 0b01;
        const DIRTY = 0b10;
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    vpn: usize,
    paddr: usize,
    flags: TlbFlags,
}

impl Entry {
    const INVALID: Entry = Entry { vpn: 0, paddr: 0, flags: TlbFlags::empty() };
}

/// The kind of fault the trap code reports to the refill handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Read,
    Write,
    ReadOnly,
    Other,
}

struct Inner {
    entries: [Entry; NUM_TLB_ENTRIES],
    /// Rotates across write-random targets so repeated random writes don't
    /// all land on slot 0; a teaching core has no need for a real PRNG here.
    next_victim: usize,
}

/// The single machine TLB. There is exactly one of these per CPU; this core
/// targets a single logical CPU, so one global instance suffices.
pub struct Tlb {
    inner: Mutex<Inner>,
}

impl Tlb {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: [Entry::INVALID; NUM_TLB_ENTRIES],
                next_victim: 0,
            }),
        }
    }

    /// Invalidate every entry. Called on address-space activation and after
    /// `complete_load`.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries = [Entry::INVALID; NUM_TLB_ENTRIES];
    }

    /// Install a translation, writing to the first invalid slot if one
    /// exists, or a rotating "random" victim otherwise. Mirrors the refill
    /// handler's probe-then-random-write fallback.
    pub fn install(&self, vaddr: usize, paddr: usize, dirty: bool) {
        let vpn = vaddr & !(PAGE_SIZE - 1);
        let mut flags = TlbFlags::VALID;
        if dirty {
            flags |= TlbFlags::DIRTY;
        }

        let mut inner = self.inner.lock();
        if let Some(slot) = inner
            .entries
            .iter()
            .position(|e| !e.flags.contains(TlbFlags::VALID))
        {
            inner.entries[slot] = Entry { vpn, paddr, flags };
            return;
        }

        let victim = inner.next_victim;
        inner.next_victim = (victim + 1) % NUM_TLB_ENTRIES;
        inner.entries[victim] = Entry { vpn, paddr, flags };
    }

    /// Look up a translation, mirroring a hardware TLB hit. Exposed mainly
    /// for tests that want to assert the read-only gate took effect.
    pub fn lookup(&self, vaddr: usize) -> Option<(usize, bool)> {
        let vpn = vaddr & !(PAGE_SIZE - 1);
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .find(|e| e.flags.contains(TlbFlags::VALID) && e.vpn == vpn)
            .map(|e| (e.paddr, e.flags.contains(TlbFlags::DIRTY)))
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII scope disabling interrupts for the duration, restoring the prior
/// level on every exit path (including panics unwinding through it). Stands
/// in for `splhigh`/`splx`: there is no real interrupt controller here, but
/// the refill handler's contract ("probe-write runs with interrupts off")
/// is still meaningful to model and test for correct scoping.
pub struct InterruptGuard {
    was_enabled: bool,
}

static INTERRUPTS_ENABLED: Mutex<bool> = Mutex::new(true);

impl InterruptGuard {
    pub fn disable() -> Self {
        let mut enabled = INTERRUPTS_ENABLED.lock();
        let was_enabled = *enabled;
        *enabled = false;
        Self { was_enabled }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        *INTERRUPTS_ENABLED.lock() = self.was_enabled;
    }
}

/// Query whether interrupts are currently enabled, for tests asserting the
/// refill handler never leaves them disabled after returning.
pub fn interrupts_enabled() -> bool {
    *INTERRUPTS_ENABLED.lock()
}
