//! Synchronization primitives
//!
//! The one primitive this core actually needs beyond the locks `spin`
//! already provides: direction-based admission control for the
//! intersection driver (C6).

pub mod intersection;

pub use intersection::{Direction, Intersection};
