//! Console sink
//!
//! The logging facade (`log_setup`) needs somewhere to put formatted lines.
//! On real hardware that is a serial port; under test it is whatever the
//! host gives us. Keeping this behind a trait means `log_setup` never has
//! to know which.

use core::fmt;

/// A destination for formatted log output.
pub trait ConsoleSink: Sync {
    fn write_str(&self, s: &str);
}

/// Discards everything written to it. The default sink until something
/// installs a real one, so early log calls never panic on a missing
/// global.
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn write_str(&self, _s: &str) {}
}

/// Captures written lines in a fixed ring for tests to inspect, instead of
/// emitting them anywhere.
pub struct CaptureSink {
    lines: spin::Mutex<alloc::collections::VecDeque<alloc::string::String>>,
    capacity: usize,
}

impl CaptureSink {
    pub fn new(capacity: usize) -> Self {
        Self { lines: spin::Mutex::new(alloc::collections::VecDeque::new()), capacity }
    }

    pub fn snapshot(&self) -> alloc::vec::Vec<alloc::string::String> {
        self.lines.lock().iter().cloned().collect()
    }
}

impl ConsoleSink for CaptureSink {
    fn write_str(&self, s: &str) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(alloc::string::String::from(s));
    }
}

/// Adapts a `ConsoleSink` to `core::fmt::Write` so `write!`/`writeln!` can
/// target it directly.
pub struct SinkWriter<'a>(pub &'a dyn ConsoleSink);

impl fmt::Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}
