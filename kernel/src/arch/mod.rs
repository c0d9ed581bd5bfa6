//! Architecture support. x86_64 only.

pub mod cpu;
