//! Machine and ABI constants
//!
//! Collects the fixed numbers the rest of the kernel core is built around,
//! mirroring the way the upstream kernel keeps page size, TLB geometry, and
//! table bounds in one place instead of scattered literals.

/// Bytes per physical/virtual page.
pub const PAGE_SIZE: usize = 4096;

/// Number of hardware TLB slots.
pub const NUM_TLB_ENTRIES: usize = 64;

/// Fixed user stack size, in pages, for every address space.
pub const NUM_STACK_PAGES: usize = 12;

/// Top of the user address space; the stack occupies
/// `[USERSTACK - NUM_STACK_PAGES * PAGE_SIZE, USERSTACK)`.
pub const USERSTACK: usize = 0x8000_0000;

/// Lowest pid ever handed to a user process.
pub const PID_MIN: u32 = 1;

/// Highest pid the registry will assign.
pub const PID_MAX: u32 = 255;

/// Reserved pid for the kernel bootstrap process; never has a table entry.
pub const PID_KERN: u32 = 0;

/// Sentinel meaning "no parent" (orphan) or "no pid" depending on context.
pub const PID_NULL: u32 = 0;

/// Sentinel exit code meaning "still running".
pub const EXITCODE_NULL: i32 = i32::MIN;

/// Maximum number of vehicles one direction may admit before the
/// intersection must drain.
pub const INTERSECTION_MAX: u32 = 5;

/// Maximum length, in bytes, of a path or argv string copied between user
/// and kernel buffers.
pub const PATH_MAX: usize = 1024;
