//! Logging infrastructure
//!
//! This module provides logging via the `log` crate. The platform registers a
//! line sink (usually its debug UART) with [`init`]; records logged before that
//! are dropped.

use core::fmt;
use log::{Level, LevelFilter, Metadata, Record};

/// Destination for formatted log lines
pub trait LogSink: Sync {
    /// Write one complete line (without trailing newline)
    fn write_line(&self, line: fmt::Arguments<'_>);
}

static SINK: spin::Once<&'static dyn LogSink> = spin::Once::new();

/// Sink-backed logger implementation
struct SinkLogger;

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else {
            return;
        };

        let level_str = match record.level() {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn => "\x1b[33mWARN\x1b[0m ",
            Level::Info => "\x1b[32mINFO\x1b[0m ",
            Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };

        // Format: [LEVEL] target: message
        sink.write_line(format_args!(
            "[{}] {}: {}",
            level_str,
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

static LOGGER: SinkLogger = SinkLogger;

/// Initialize the logging subsystem
///
/// The first registered sink wins; later calls only fail because the global
/// logger is already installed.
pub fn init(sink: &'static dyn LogSink, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;
    use std::sync::Mutex;

    struct CaptureSink(Mutex<String>);

    impl LogSink for CaptureSink {
        fn write_line(&self, line: fmt::Arguments<'_>) {
            use core::fmt::Write;
            let mut out = self.0.lock().unwrap();
            let _ = out.write_fmt(line);
            out.push('\n');
        }
    }

    static CAPTURE: CaptureSink = CaptureSink(Mutex::new(String::new()));

    #[test]
    fn records_reach_registered_sink() {
        init(&CAPTURE, LevelFilter::Debug).unwrap();
        log::warn!(target: "ohci", "port {} over current", 1);
        log::trace!(target: "ohci", "filtered out");

        let out = CAPTURE.0.lock().unwrap();
        assert!(out.contains("WARN"));
        assert!(out.contains("ohci: port 1 over current"));
        assert!(!out.contains("filtered out"));
    }
}
