//! The context-switch primitive and its stack-priming counterpart.
//!
//! These two halves share a single contract: [`prime_stack`] lays out a
//! fresh stack so that the restore path of [`switch_context`] pops six
//! zeroed callee-saved registers and then `ret`s into the task's entry
//! function. The priming layout and the pop sequence below must stay in
//! lockstep; that is why both live in this file.

/// Entry point type for kernel tasks.
///
/// A task is entered by the context switch `ret`ing into it and is
/// expected never to return — there is nothing on its stack to return to.
pub type TaskEntry = extern "C" fn() -> !;

core::arch::global_asm!(
    ".global cinder_switch_context",
    "cinder_switch_context:",
    // rdi = outgoing saved-SP slot (*mut u64), null on first dispatch
    // rsi = incoming saved-SP slot (*const u64), never null
    //
    // Skip the save when there is no outgoing task.
    "test rdi, rdi",
    "jz 2f",
    // Save callee-saved registers on the outgoing stack, then publish
    // the resulting stack pointer through the outgoing slot.
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "2:",
    // Adopt the incoming stack and restore in reverse push order.
    "mov rsp, [rsi]",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    // Return on the restored stack: either to where the incoming task
    // last suspended, or into its entry function on first entry.
    "ret",
);

unsafe extern "C" {
    fn cinder_switch_context(outgoing: *mut u64, incoming: *const u64);
}

/// The pair of saved-stack-pointer slots one switch operates on.
#[derive(Debug, Clone, Copy)]
pub struct SwitchFrames {
    /// Slot that receives the outgoing task's stack pointer. `None` on
    /// the first dispatch, when there is no context worth keeping.
    pub outgoing: Option<*mut u64>,
    /// Slot holding the incoming task's saved stack pointer.
    pub incoming: *const u64,
}

/// Swap execution onto the incoming task's stack.
///
/// Either returns after the outgoing context has been restored by a
/// later switch back, or — with `outgoing: None` — never returns on
/// this stack at all.
///
/// # Safety
///
/// `incoming` must point to a saved stack pointer produced by
/// [`prime_stack`] or by a previous save through this primitive, and the
/// slots must stay valid for the lifetime of the tasks involved. The
/// caller must hold no locks and run with interrupts masked.
pub unsafe fn switch_context(frames: SwitchFrames) {
    let outgoing = frames.outgoing.unwrap_or(core::ptr::null_mut());
    unsafe { cinder_switch_context(outgoing, frames.incoming) }
}

/// Callee-saved register slots in a primed frame (rbp, rbx, r12-r15).
const CALLEE_SAVED_SLOTS: u64 = 6;

/// Prime a fresh stack so the first restore enters `entry`.
///
/// Layout, descending from the 16-byte-aligned stack top:
///
/// ```text
///   [top -  8]  (unused; keeps rsp % 16 == 8 at entry, as the ABI
///                leaves it after a call)
///   [top - 16]  entry address — the final `ret` target
///   [top - 24]  rbp = 0
///   ...
///   [top - 64]  r15 = 0          <- returned stack pointer
/// ```
///
/// Returns the saved stack pointer for the task's PCB.
///
/// # Safety
///
/// `stack_top` must be the one-past-the-end address of a writable stack
/// region with room for the frame.
pub unsafe fn prime_stack(stack_top: *mut u8, entry: TaskEntry) -> u64 {
    let top = (stack_top as u64) & !0xF;
    let entry_slot = top - 16;
    let sp = entry_slot - CALLEE_SAVED_SLOTS * 8;

    unsafe {
        (entry_slot as *mut u64).write(entry as usize as u64);
        for i in 0..CALLEE_SAVED_SLOTS {
            ((sp + i * 8) as *mut u64).write(0);
        }
    }

    sp
}
