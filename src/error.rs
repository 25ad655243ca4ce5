//! Kernel error types
//!
//! A single crate-wide error enum replaces raw errno integers and bare
//! string literals in the process/memory core, the way the upstream kernel
//! centralizes its own `KernelError`.

use core::fmt;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No free frames available to satisfy an allocation.
    OutOfMemory { requested: usize, available: usize },
    /// A virtual address did not classify into any segment.
    InvalidAddress { addr: usize },
    /// A user wrote to a page mapped read-only (text after `complete_load`).
    ReadOnlyFault { addr: usize },
    /// Fault type was neither READ, WRITE, nor READONLY.
    InvalidFaultType,
    /// A third region was defined for an address space; only two are
    /// supported (conventionally text and data).
    TooManyRegions,
    /// No such process exists.
    ProcessNotFound { pid: u32 },
    /// The caller is not the parent of the pid it tried to `wait` on.
    NotMyChild { pid: u32 },
    /// An unsupported argument was passed (e.g. non-zero `waitpid` options,
    /// an empty program name).
    InvalidArgument { name: &'static str },
    /// Generic invalid-state condition surfaced as a typed error rather
    /// than a panic, used where the caller can recover.
    InvalidState { expected: &'static str, actual: &'static str },
    /// An operation named but never implemented in this core, e.g. TLB
    /// shootdown on a single-CPU machine.
    Unimplemented { operation: &'static str },
    /// The external VFS/ELF loader collaborator reported a failure.
    LoadFailed,
    /// Subsystem not initialized (called before bootstrap()).
    NotInitialized { subsystem: &'static str },
}

/// Result type alias for kernel-core operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, available } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address 0x{:x}", addr),
            Self::ReadOnlyFault { addr } => write!(f, "write fault on read-only page 0x{:x}", addr),
            Self::InvalidFaultType => write!(f, "invalid fault type"),
            Self::TooManyRegions => write!(f, "too many regions: at most two are supported"),
            Self::ProcessNotFound { pid } => write!(f, "process {} not found", pid),
            Self::NotMyChild { pid } => write!(f, "pid {} is not a child of the caller", pid),
            Self::InvalidArgument { name } => write!(f, "invalid argument: {}", name),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {}, got {}", expected, actual)
            }
            Self::Unimplemented { operation } => write!(f, "not implemented: {}", operation),
            Self::LoadFailed => write!(f, "program load failed"),
            Self::NotInitialized { subsystem } => write!(f, "{} not initialized", subsystem),
        }
    }
}

/// The fixed errno space the syscall ABI exposes to user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    Enomem = 12,
    Efault = 14,
    Einval = 22,
    Esrch = 3,
    Echild = 10,
    Eunimp = 88,
}

impl KernelError {
    /// Map a typed kernel error onto the numeric errno returned at the
    /// syscall boundary. Only the syscall layer (C5) should call this; C1-C4
    /// operate on `KernelError` directly.
    pub fn to_errno(self) -> Errno {
        match self {
            Self::OutOfMemory { .. } => Errno::Enomem,
            Self::InvalidAddress { .. } | Self::ReadOnlyFault { .. } | Self::LoadFailed => {
                Errno::Efault
            }
            Self::InvalidFaultType | Self::InvalidArgument { .. } | Self::InvalidState { .. } => {
                Errno::Einval
            }
            Self::TooManyRegions | Self::Unimplemented { .. } => Errno::Eunimp,
            Self::ProcessNotFound { .. } => Errno::Esrch,
            Self::NotMyChild { .. } => Errno::Echild,
            Self::NotInitialized { .. } => Errno::Efault,
        }
    }
}
