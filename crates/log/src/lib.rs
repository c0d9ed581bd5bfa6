//! Kernel logging over the serial byte sink.
//!
//! Installs a [`log::Log`] implementation that renders level-tagged,
//! ANSI-colored lines on COM1, so every subsystem logs through the
//! standard `log` facade macros. Also exports raw `print!`/`println!`
//! macros for unleveled output (shell prompt, statistics blocks, the
//! boot banner).
//!
//! Until [`init`] runs — and on hosted builds, where it never runs —
//! the facade has no logger and the serial driver drops every byte, so
//! logging is always safe to call.
#![no_std]

use core::fmt;
use log::{Level, LevelFilter, Metadata, Record};

struct SerialLogger;

fn tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => " INFO",
        Level::Warn => " WARN",
        Level::Error => "ERROR",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        cinder_hal::serial::write_str(color(record.level()));
        cinder_hal::serial::write_str("[");
        cinder_hal::serial::write_str(tag(record.level()));
        cinder_hal::serial::write_str("]\x1b[0m ");
        cinder_hal::serial::write_fmt(*record.args());
        cinder_hal::serial::write_str("\n");
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Bring up the serial port and install the kernel logger.
pub fn init() {
    cinder_hal::serial::init();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

/// Print to serial without a level prefix.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    cinder_hal::serial::write_fmt(args);
}

/// Print without newline
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::_print(format_args!($($arg)*))
    };
}

/// Print with newline
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::_print(format_args!($($arg)*));
        $crate::_print(format_args!("\n"));
    }};
}
