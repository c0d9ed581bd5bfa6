//! Process management and scheduling.
//!
//! [`process`] owns the process table and IPC mailboxes, [`sched`] owns
//! the scheduling policy and drives the current-process designation, and
//! [`switch`] holds the two halves of the context-switch ABI (the asm
//! primitive and the stack priming that feeds it).
//!
//! Lock order across the kernel singletons: memory before process table,
//! scheduler before process table. No path takes them the other way.

pub mod process;
pub mod sched;
pub mod switch;
