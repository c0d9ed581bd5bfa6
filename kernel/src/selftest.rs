//! In-kernel subsystem tests.
//!
//! Exercises the live memory, process and scheduler singletons and
//! reports `[OK]`/`[FAIL]` lines over serial. Runs at boot and on the
//! shell's `tes` command.
//!
//! Each run starts by re-initializing all three subsystems — that is
//! what makes the command repeatable on a table whose slots and PIDs
//! are otherwise never reclaimed. Test processes stay in the table
//! afterwards, which `pro` deliberately shows.

use cinder_log::println;

use crate::memory;
use crate::task::process::{self, ProcState, ProcessError};
use crate::task::sched;

/// A schedulable entry for the processes the tests create. The tests
/// never dispatch them; the body exists for the stack priming to point
/// at.
extern "C" fn test_task() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Run every self test, logging results as we go.
pub fn run() {
    println!("\n[TEST] kernel self tests");

    memory::init();
    process::init();
    sched::init();

    let mut failed = 0u32;
    check(&mut failed, "memory lifecycle", memory_lifecycle());
    check(&mut failed, "process lifecycle", process_lifecycle());
    check(&mut failed, "priority selection", priority_selection());
    check(&mut failed, "ipc fifo", ipc_fifo());
    check(&mut failed, "quantum bounds", quantum_bounds());
    check(&mut failed, "tick-driven aging", tick_aging());

    if failed == 0 {
        println!("[TEST] all self tests passed\n");
    } else {
        println!("[TEST] {} self test(s) FAILED\n", failed);
    }
}

fn check(failed: &mut u32, name: &str, ok: bool) {
    if ok {
        println!("[OK] {}", name);
    } else {
        println!("[FAIL] {}", name);
        *failed += 1;
    }
}

fn memory_lifecycle() -> bool {
    let before = memory::stats();

    let p1 = memory::kmalloc(50);
    let p2 = memory::kmalloc(100);
    let p3 = memory::kmalloc(200);
    if p1.is_null() || p2.is_null() || p3.is_null() {
        return false;
    }

    let after = memory::stats();
    if after.heap_allocations != before.heap_allocations + 3 {
        return false;
    }
    if after.total_allocated != before.total_allocated + 352 {
        return false;
    }

    memory::kfree(p1);
    memory::stats().total_freed == before.total_freed + 52
}

fn process_lifecycle() -> bool {
    let pid = match process::create(test_task, 5) {
        Ok(pid) => pid,
        Err(_) => return false,
    };

    if process::get_state(pid) != ProcState::Ready {
        return false;
    }
    if process::set_state(pid, ProcState::Blocked).is_err()
        || process::get_state(pid) != ProcState::Blocked
    {
        return false;
    }
    if process::set_state(pid, ProcState::Ready).is_err() {
        return false;
    }

    let live = process::count_active();
    if process::set_current(pid).is_err() || process::current_pid() != Some(pid) {
        return false;
    }
    if process::exit().is_err() {
        return false;
    }

    process::get_state(pid) == ProcState::Terminated && process::count_active() == live - 1
}

fn priority_selection() -> bool {
    let a = process::create(test_task, 10);
    let b = process::create(test_task, 3);
    let c = process::create(test_task, 7);
    let (Ok(_), Ok(b), Ok(_)) = (a, b, c) else {
        return false;
    };

    sched::next_pid() == Some(b)
}

fn ipc_fifo() -> bool {
    let (Ok(sender), Ok(receiver)) =
        (process::create(test_task, 10), process::create(test_task, 10))
    else {
        return false;
    };

    if process::set_current(sender).is_err() {
        return false;
    }
    for value in [100, 101, 102] {
        if process::send(receiver, value).is_err() {
            return false;
        }
    }

    if process::set_current(receiver).is_err() {
        return false;
    }
    for expected in [100, 101, 102] {
        if process::receive() != Ok(expected) {
            return false;
        }
    }
    process::receive() == Err(ProcessError::MailboxEmpty)
}

fn quantum_bounds() -> bool {
    let initial = sched::quantum();

    sched::set_quantum(0);
    if sched::quantum() != initial {
        return false;
    }
    sched::set_quantum(101);
    if sched::quantum() != initial {
        return false;
    }

    sched::set_quantum(25);
    let accepted = sched::quantum() == 25;
    sched::set_quantum(initial);
    accepted
}

fn tick_aging() -> bool {
    // Nothing is Running at this point, so ticking only counts time and
    // ages the Ready test processes; it cannot swap stacks out from
    // under this caller.
    let pid = match process::create(test_task, 15) {
        Ok(pid) => pid,
        Err(_) => return false,
    };

    let base_ticks = sched::ticks();
    let ticks_to_boundary = sched::AGING_THRESHOLD - (base_ticks % sched::AGING_THRESHOLD);
    for _ in 0..ticks_to_boundary {
        sched::tick();
    }

    process::with_table(|table| table.get(pid).map(|p| p.age) == Some(1))
}
