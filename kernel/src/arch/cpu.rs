//! CPU control helpers.

use x86_64::instructions::{hlt, interrupts};

/// Mask maskable interrupts on this core.
///
/// The kernel core runs single-core with interrupts off; the timer
/// collaborator, when present, re-enables them around its own handler.
pub fn disable_interrupts() {
    interrupts::disable();
}

/// Idle the CPU forever.
///
/// `hlt` in a loop; with interrupts masked this never wakes up. Used by
/// the shell's exit command and the panic handler.
pub fn halt_loop() -> ! {
    loop {
        hlt();
    }
}
