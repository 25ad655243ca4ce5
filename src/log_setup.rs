//! `log` facade wiring
//!
//! C1-C6 call the ordinary `log::{error,warn,info,debug,trace}!` macros;
//! this module is the one-time glue that routes those calls into the
//! structured circular buffer in [`crate::log_service`] instead of dropping
//! them. Installed once during bootstrap via [`init`].

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::log_service::{self, LogLevel};

fn level_to_log_level(level: Level) -> LogLevel {
    match level {
        Level::Error => LogLevel::Error,
        Level::Warn => LogLevel::Warn,
        Level::Info => LogLevel::Info,
        Level::Debug => LogLevel::Debug,
        Level::Trace => LogLevel::Trace,
    }
}

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let subsystem = record.target();
        // log_service truncates the formatted message to its fixed-size
        // inline buffer; core::fmt has no allocation-free way to cap a
        // Display's output length, so a short-lived formatting buffer is
        // used only to bridge the two APIs.
        let mut buf = heapless_message_buf();
        if let Ok(()) = core::fmt::write(&mut buf, *record.args()) {
            log_service::klog(level_to_log_level(record.level()), subsystem, buf.as_str());
        }
    }

    fn flush(&self) {}
}

const MESSAGE_BUF_LEN: usize = 128;

struct MessageBuf {
    bytes: [u8; MESSAGE_BUF_LEN],
    len: usize,
}

fn heapless_message_buf() -> MessageBuf {
    MessageBuf { bytes: [0u8; MESSAGE_BUF_LEN], len: 0 }
}

impl MessageBuf {
    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl core::fmt::Write for MessageBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let remaining = MESSAGE_BUF_LEN - self.len;
        let take = s.len().min(remaining);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Install the kernel logger as the `log` crate's global logger and enable
/// every level up to `max`. Safe to call more than once; later calls are
/// rejected by `log::set_logger` and ignored here.
pub fn init(max: LevelFilter) {
    log_service::log_init();
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max);
}
