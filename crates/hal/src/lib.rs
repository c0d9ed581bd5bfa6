//! Hardware access layer for the Cinder kernel.
//!
//! The only hardware the kernel core talks to is the COM1 UART, which
//! serves as its byte sink for logging, statistics and shell I/O.
#![no_std]

pub mod port;
pub mod serial;
