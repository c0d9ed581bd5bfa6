//! Line-oriented command shell over the serial byte sink.
//!
//! After boot the shell loop doubles as the null process: with no timer
//! collaborator wired up, the kernel idles here reading commands.
//! Commands are matched by prefix (`mem`, `pro`, `sch`, `tes`, `exi`),
//! so `memory`, `mem` and `memstats` all work.

use cinder_log::{print, println};

use crate::{arch, memory, task};

/// Input line limit: 127 visible bytes plus the terminator slot.
const MAX_INPUT: usize = 128;

/// Run the shell forever.
pub fn run() -> ! {
    println!("Type 'help' for the command list.");
    let mut line = [0u8; MAX_INPUT];
    loop {
        print!("cinder> ");
        let len = read_line(&mut line);
        dispatch(&line[..len]);
    }
}

/// Read one line, echoing input and handling backspace. Returns the
/// number of bytes captured; input beyond the buffer is dropped.
fn read_line(buf: &mut [u8; MAX_INPUT]) -> usize {
    let mut pos = 0;
    loop {
        let byte = cinder_hal::serial::read_byte();
        match byte {
            b'\r' | b'\n' => {
                println!();
                return pos;
            }
            // Backspace / DEL: erase the character on screen too.
            0x08 | 0x7F if pos > 0 => {
                pos -= 1;
                print!("\x08 \x08");
            }
            0x20..=0x7E if pos < MAX_INPUT - 1 => {
                buf[pos] = byte;
                pos += 1;
                cinder_hal::serial::write_byte(byte);
            }
            _ => {}
        }
    }
}

fn dispatch(line: &[u8]) {
    if line.is_empty() {
        return;
    }

    if line.starts_with(b"help") {
        help();
    } else if line.starts_with(b"mem") {
        memory::print_stats();
    } else if line.starts_with(b"pro") {
        task::process::list();
    } else if line.starts_with(b"sch") {
        task::sched::print_stats();
    } else if line.starts_with(b"tes") {
        run_tests();
    } else if line.starts_with(b"exi") {
        println!("halting.");
        arch::cpu::halt_loop();
    } else {
        println!("unknown command (try 'help')");
    }
}

fn help() {
    println!("commands:");
    println!("  help  this list");
    println!("  mem   memory statistics");
    println!("  pro   process table");
    println!("  sch   scheduler statistics");
    println!("  tes   rerun the built-in self tests");
    println!("  exi   halt the kernel");
}

#[cfg(feature = "self_test")]
fn run_tests() {
    crate::selftest::run();
}

#[cfg(not(feature = "self_test"))]
fn run_tests() {
    println!("self tests not compiled in (enable the `self_test` feature)");
}
