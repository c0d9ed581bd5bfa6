//! The process table — creation, lifecycle, and message passing.
//!
//! A fixed array of [`MAX_PROCESSES`] process control blocks. A slot is
//! free iff its state is [`ProcState::Unused`]; once a process
//! terminates its slot is not reclaimed and its PID never repeats
//! within a run. Each PCB owns one kernel stack (taken from the memory
//! manager at creation, released at exit) and a bounded FIFO mailbox
//! that only the owning process drains.

use core::fmt;

use cinder_log::println;
use log::{debug, error, info, trace};
use spin::Mutex;

use crate::memory::{self, MemoryManager, STACK_SIZE};
use crate::task::switch::{self, TaskEntry};

/// Capacity of the process table.
pub const MAX_PROCESSES: usize = 16;

/// Capacity of each per-process mailbox.
pub const MAX_MESSAGES: usize = 8;

/// Numerically smallest (i.e. most urgent) priority.
pub const PRIORITY_MIN: u8 = 1;

/// Numerically largest (i.e. least urgent) priority.
pub const PRIORITY_MAX: u8 = 20;

/// Priority given to freshly initialized table slots.
pub const DEFAULT_PRIORITY: u8 = 10;

/// Process identifier. Strictly increasing from 1; 0 means "no process".
pub type Pid = u32;

/// The possible states of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Slot is free.
    Unused,
    /// Ready to be scheduled.
    Ready,
    /// Currently running on the CPU.
    Running,
    /// Waiting for an event.
    Blocked,
    /// Voluntarily asleep.
    Sleeping,
    /// Finished; the slot is never reused.
    Terminated,
}

impl ProcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcState::Unused => "UNUSED",
            ProcState::Ready => "READY",
            ProcState::Running => "RUNNING",
            ProcState::Blocked => "BLOCKED",
            ProcState::Sleeping => "SLEEPING",
            ProcState::Terminated => "TERMINATED",
        }
    }
}

/// One mailbox entry: a 32-bit value tagged with who sent it.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub sender: Pid,
    pub value: u32,
}

impl Message {
    const EMPTY: Self = Self { sender: 0, value: 0 };
}

/// Process-management failures. Values, never unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// No free slot in the process table.
    TableFull,
    /// The memory manager could not provide a stack.
    OutOfMemory,
    /// No PCB with that PID.
    NotFound,
    /// The operation needs a current process and none is designated.
    NoCurrent,
    /// The destination mailbox already holds [`MAX_MESSAGES`] entries.
    MailboxFull,
    /// The caller's mailbox is empty.
    MailboxEmpty,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ProcessError::TableFull => "process table full",
            ProcessError::OutOfMemory => "out of memory",
            ProcessError::NotFound => "no such process",
            ProcessError::NoCurrent => "no current process",
            ProcessError::MailboxFull => "mailbox full",
            ProcessError::MailboxEmpty => "mailbox empty",
        };
        f.write_str(msg)
    }
}

/// Process Control Block — everything the kernel tracks per task.
pub struct Pcb {
    pub pid: Pid,
    pub state: ProcState,
    /// Arithmetic top of the owned stack; the initial push begins here.
    pub stack_base: u64,
    /// Saved stack pointer; a context restore resumes from here.
    pub stack_ptr: u64,
    /// Scheduling priority in `[PRIORITY_MIN, PRIORITY_MAX]`; lower
    /// value means scheduled sooner.
    pub priority: u8,
    /// Aging cycles spent in Ready since the last promotion reset.
    pub age: u32,
    msg_queue: [Message; MAX_MESSAGES],
    msg_count: usize,
}

impl Pcb {
    const UNUSED: Self = Self {
        pid: 0,
        state: ProcState::Unused,
        stack_base: 0,
        stack_ptr: 0,
        priority: DEFAULT_PRIORITY,
        age: 0,
        msg_queue: [Message::EMPTY; MAX_MESSAGES],
        msg_count: 0,
    };

    /// Current mailbox depth.
    pub fn msg_count(&self) -> usize {
        self.msg_count
    }
}

/// The fixed-capacity process table plus the current-process designation.
pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
    /// Index of the current process, if any. Driven by the scheduler;
    /// [`ProcessTable::set_current`] exists for bootstrap and tests.
    current: Option<usize>,
    next_pid: Pid,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [Pcb::UNUSED; MAX_PROCESSES],
            current: None,
            next_pid: 1,
        }
    }

    /// Reset every slot to Unused and restart the PID counter. Idempotent.
    pub fn init(&mut self) {
        self.slots = [Pcb::UNUSED; MAX_PROCESSES];
        self.current = None;
        self.next_pid = 1;
        info!("[process] initialized (max={} processes)", MAX_PROCESSES);
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|p| p.state == ProcState::Unused)
    }

    fn index_of(&self, pid: Pid) -> Option<usize> {
        if pid == 0 {
            return None;
        }
        self.slots.iter().position(|p| p.pid == pid)
    }

    /// Create a process that will enter `entry` when first dispatched.
    ///
    /// Takes a stack from the memory manager, primes it so the first
    /// context restore returns into `entry`, and clamps `priority` into
    /// `[PRIORITY_MIN, PRIORITY_MAX]`. The new PCB starts Ready with an
    /// empty mailbox.
    pub fn create(
        &mut self,
        mem: &mut MemoryManager,
        entry: TaskEntry,
        priority: u8,
    ) -> Result<Pid, ProcessError> {
        let Some(slot) = self.free_slot() else {
            error!("[process] FAIL: process table full");
            return Err(ProcessError::TableFull);
        };

        let stack = mem.alloc_stack();
        if stack.is_null() {
            error!("[process] FAIL: no memory for stack");
            return Err(ProcessError::OutOfMemory);
        }
        // alloc_stack hands out the low address; pushes start at the top.
        let stack_top = stack as u64 + STACK_SIZE as u64;

        let pid = self.next_pid;
        self.next_pid += 1;

        let pcb = &mut self.slots[slot];
        pcb.pid = pid;
        pcb.state = ProcState::Ready;
        pcb.priority = priority.clamp(PRIORITY_MIN, PRIORITY_MAX);
        pcb.age = 0;
        pcb.stack_base = stack_top;
        // SAFETY: the stack region was just allocated and is unaliased.
        pcb.stack_ptr = unsafe { switch::prime_stack(stack_top as *mut u8, entry) };
        pcb.msg_queue = [Message::EMPTY; MAX_MESSAGES];
        pcb.msg_count = 0;

        info!("[process] created PID {} (priority={})", pid, pcb.priority);
        Ok(pid)
    }

    /// Terminate the current process and release its stack.
    ///
    /// Does not yield: the current designation stays on the terminated
    /// PCB until the scheduler dispatches a successor.
    pub fn exit(&mut self, mem: &mut MemoryManager) -> Result<(), ProcessError> {
        let Some(idx) = self.current else {
            error!("[process] ERROR: no current process");
            return Err(ProcessError::NoCurrent);
        };

        let pcb = &mut self.slots[idx];
        info!("[process] exit PID {} (state=TERMINATED)", pcb.pid);
        pcb.state = ProcState::Terminated;
        mem.free_stack((pcb.stack_base - STACK_SIZE as u64) as *mut u8);
        Ok(())
    }

    /// Assign `state` to the PCB with `pid`.
    ///
    /// Any transition is accepted; callers are trusted to respect the
    /// lifecycle.
    pub fn set_state(&mut self, pid: Pid, state: ProcState) -> Result<(), ProcessError> {
        let Some(idx) = self.index_of(pid) else {
            error!("[process] ERROR: invalid PID {}", pid);
            return Err(ProcessError::NotFound);
        };
        self.slots[idx].state = state;
        debug!("[process] PID {} state -> {}", pid, state.as_str());
        Ok(())
    }

    /// State of the PCB with `pid`; Unused when there is none.
    pub fn get_state(&self, pid: Pid) -> ProcState {
        match self.index_of(pid) {
            Some(idx) => self.slots[idx].state,
            None => ProcState::Unused,
        }
    }

    /// Look up a PCB by PID.
    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.index_of(pid).map(|idx| &self.slots[idx])
    }

    /// PID of the current process, if one is designated.
    pub fn current_pid(&self) -> Option<Pid> {
        self.current.map(|idx| self.slots[idx].pid)
    }

    /// Designate the process with `pid` as current.
    ///
    /// The scheduler normally owns this through `context_switch`; this
    /// entry point exists for boot-time bootstrap and for tests, which
    /// must not poke table internals directly.
    pub fn set_current(&mut self, pid: Pid) -> Result<(), ProcessError> {
        let Some(idx) = self.index_of(pid) else {
            error!("[process] ERROR: invalid PID {}", pid);
            return Err(ProcessError::NotFound);
        };
        self.current = Some(idx);
        Ok(())
    }

    /// Number of live processes: slots in use and not yet terminated.
    pub fn count_active(&self) -> usize {
        self.slots
            .iter()
            .filter(|p| p.state != ProcState::Unused && p.state != ProcState::Terminated)
            .count()
    }

    /// Emit the process table on the byte sink.
    pub fn list(&self) {
        println!("\n========== PROCESS TABLE ==========");
        let mut count = 0;
        for pcb in &self.slots {
            if pcb.state != ProcState::Unused {
                count += 1;
                println!(
                    "PID {}: state={}, priority={}, age={}",
                    pcb.pid,
                    pcb.state.as_str(),
                    pcb.priority,
                    pcb.age
                );
            }
        }
        println!("Total processes: {}", count);
        println!("===================================\n");
    }

    /// Queue `value` on the mailbox of `dest_pid`, tagged with the
    /// current process as sender.
    pub fn send(&mut self, dest_pid: Pid, value: u32) -> Result<(), ProcessError> {
        let Some(sender_idx) = self.current else {
            error!("[IPC] ERROR: no current process");
            return Err(ProcessError::NoCurrent);
        };
        let sender_pid = self.slots[sender_idx].pid;

        let dest_idx = match self.index_of(dest_pid) {
            Some(idx) if self.slots[idx].state != ProcState::Unused => idx,
            _ => {
                error!("[IPC] ERROR: invalid destination PID {}", dest_pid);
                return Err(ProcessError::NotFound);
            }
        };

        let dest = &mut self.slots[dest_idx];
        if dest.msg_count >= MAX_MESSAGES {
            error!("[IPC] ERROR: mailbox full for PID {}", dest_pid);
            return Err(ProcessError::MailboxFull);
        }

        dest.msg_queue[dest.msg_count] = Message {
            sender: sender_pid,
            value,
        };
        dest.msg_count += 1;

        trace!("[IPC] message sent from PID {} to PID {}", sender_pid, dest_pid);
        Ok(())
    }

    /// Dequeue the oldest message from the current process's mailbox.
    ///
    /// Non-blocking: an empty mailbox is an error, not a wait.
    pub fn receive(&mut self) -> Result<u32, ProcessError> {
        let Some(idx) = self.current else {
            error!("[IPC] ERROR: no current process");
            return Err(ProcessError::NoCurrent);
        };

        let pcb = &mut self.slots[idx];
        if pcb.msg_count == 0 {
            debug!("[IPC] no message available");
            return Err(ProcessError::MailboxEmpty);
        }

        let value = pcb.msg_queue[0].value;
        pcb.msg_queue.copy_within(1..pcb.msg_count, 0);
        pcb.msg_count -= 1;

        trace!("[IPC] received message value={}", value);
        Ok(value)
    }

    // ── Scheduler access ────────────────────────────────────────────

    pub(crate) fn slots(&self) -> &[Pcb; MAX_PROCESSES] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Pcb; MAX_PROCESSES] {
        &mut self.slots
    }

    pub(crate) fn slot(&self, idx: usize) -> &Pcb {
        &self.slots[idx]
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> &mut Pcb {
        &mut self.slots[idx]
    }

    pub(crate) fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn set_current_slot(&mut self, idx: usize) {
        self.current = Some(idx);
    }
}

// ── Kernel singleton ────────────────────────────────────────────────

/// The kernel's process table.
static TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

/// Run `f` with the process table locked. The scheduler wrappers use
/// this; they take their own lock first (see the module docs on lock
/// order).
pub(crate) fn with_table<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    f(&mut TABLE.lock())
}

/// Reset the process table.
pub fn init() {
    TABLE.lock().init();
}

/// Create a process around `entry` with the given priority.
pub fn create(entry: TaskEntry, priority: u8) -> Result<Pid, ProcessError> {
    memory::with(|mem| TABLE.lock().create(mem, entry, priority))
}

/// Terminate the current process.
pub fn exit() -> Result<(), ProcessError> {
    memory::with(|mem| TABLE.lock().exit(mem))
}

/// Assign a state to the process with `pid`.
pub fn set_state(pid: Pid, state: ProcState) -> Result<(), ProcessError> {
    TABLE.lock().set_state(pid, state)
}

/// State of the process with `pid`; Unused when there is none.
pub fn get_state(pid: Pid) -> ProcState {
    TABLE.lock().get_state(pid)
}

/// PID of the current process, if any.
pub fn current_pid() -> Option<Pid> {
    TABLE.lock().current_pid()
}

/// Designate the process with `pid` as current (bootstrap/testing).
pub fn set_current(pid: Pid) -> Result<(), ProcessError> {
    TABLE.lock().set_current(pid)
}

/// Number of live processes.
pub fn count_active() -> usize {
    TABLE.lock().count_active()
}

/// Emit the process table on the byte sink.
pub fn list() {
    TABLE.lock().list();
}

/// Send `value` to the mailbox of `dest_pid`.
pub fn send(dest_pid: Pid, value: u32) -> Result<(), ProcessError> {
    TABLE.lock().send(dest_pid, value)
}

/// Dequeue the oldest message addressed to the current process.
pub fn receive() -> Result<u32, ProcessError> {
    TABLE.lock().receive()
}
