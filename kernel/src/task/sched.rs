//! Priority scheduler with round-robin ties, quantum accounting and aging.
//!
//! Selection picks the Ready PCB with the numerically smallest priority;
//! ties go to the lowest table index. A running process is preempted when
//! its time quantum (counted in timer ticks) runs out, and every
//! [`AGING_THRESHOLD`] ticks all Ready processes age — each tenth aging
//! cycle promotes a process one priority point so low-priority work is
//! never starved.
//!
//! The scheduler computes switches as [`SwitchFrames`] pairs and performs
//! the actual stack swap only after every lock is dropped: the incoming
//! task may immediately take the same locks. Bookkeeping (current
//! designation, Running state, counters) happens before the swap — on a
//! first dispatch the primitive never returns to the caller, so anything
//! sequenced after it would be lost.

use cinder_log::println;
use log::{debug, info, warn};
use spin::Mutex;

use crate::task::process::{self, ProcState, Pid, ProcessTable, PRIORITY_MAX};
use crate::task::switch::{self, SwitchFrames};

/// Ticks a process may run before preemption, unless reconfigured.
pub const DEFAULT_QUANTUM: u32 = 10;

/// Largest accepted time quantum.
pub const MAX_QUANTUM: u32 = 100;

/// Aging runs once every this many ticks.
pub const AGING_THRESHOLD: u64 = 50;

/// Every this many aging cycles, a Ready process is promoted.
const AGE_PROMOTE_INTERVAL: u32 = 10;

/// Scheduler state: quantum accounting and monotonic counters.
pub struct Scheduler {
    time_quantum: u32,
    current_quantum: u32,
    ticks: u64,
    context_switches: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            time_quantum: DEFAULT_QUANTUM,
            current_quantum: DEFAULT_QUANTUM,
            ticks: 0,
            context_switches: 0,
        }
    }

    /// Reset quantum configuration and counters. Idempotent.
    pub fn init(&mut self) {
        *self = Self::new();
        info!("[scheduler] initialized with quantum={} ticks", DEFAULT_QUANTUM);
    }

    /// Index of the Ready PCB with the smallest priority value, ties
    /// broken by table order. `None` when nothing is Ready.
    pub fn next(&self, table: &ProcessTable) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_priority = PRIORITY_MAX + 1;

        for (idx, pcb) in table.slots().iter().enumerate() {
            if pcb.state == ProcState::Ready && pcb.priority < best_priority {
                best_priority = pcb.priority;
                best = Some(idx);
            }
        }

        best
    }

    /// Timer entry point: one tick of quantum accounting plus periodic
    /// aging. Returns the switch to perform when the current process's
    /// quantum expired.
    pub fn tick(&mut self, table: &mut ProcessTable) -> Option<SwitchFrames> {
        self.ticks += 1;

        let mut frames = None;
        if let Some(idx) = table.current_slot() {
            self.current_quantum = self.current_quantum.saturating_sub(1);
            if self.current_quantum == 0 && table.slot(idx).state == ProcState::Running {
                table.slot_mut(idx).state = ProcState::Ready;
                frames = self.context_switch(table);
            }
        }

        if self.ticks % AGING_THRESHOLD == 0 {
            self.apply_aging(table);
        }

        frames
    }

    /// Pick the next process and account the switch.
    ///
    /// With no Ready candidate this logs and returns `None`: whoever is
    /// current simply keeps running. Otherwise the chosen PCB becomes
    /// current and Running, the quantum is reset, the switch counter
    /// bumps, and the caller receives the saved-SP slot pair to hand to
    /// the primitive once all locks are dropped.
    pub fn context_switch(&mut self, table: &mut ProcessTable) -> Option<SwitchFrames> {
        let Some(next) = self.next(table) else {
            info!("[scheduler] no READY process available");
            return None;
        };

        let outgoing = match table.current_slot() {
            Some(cur) => {
                debug!(
                    "[scheduler] switch from PID {} to PID {}",
                    table.slot(cur).pid,
                    table.slot(next).pid
                );
                Some(&mut table.slot_mut(cur).stack_ptr as *mut u64)
            }
            None => {
                debug!("[scheduler] starting first process PID {}", table.slot(next).pid);
                None
            }
        };

        table.set_current_slot(next);
        let pcb = table.slot_mut(next);
        pcb.state = ProcState::Running;
        let incoming = &pcb.stack_ptr as *const u64;

        self.current_quantum = self.time_quantum;
        self.context_switches += 1;

        Some(SwitchFrames { outgoing, incoming })
    }

    /// Age every Ready process; each [`AGE_PROMOTE_INTERVAL`]th cycle
    /// promotes it one priority point (never past the floor). Returns
    /// the number of promotions.
    pub fn apply_aging(&mut self, table: &mut ProcessTable) -> u32 {
        let mut promoted = 0;

        for pcb in table.slots_mut() {
            if pcb.state == ProcState::Ready && pcb.pid != 0 {
                pcb.age += 1;
                if pcb.age % AGE_PROMOTE_INTERVAL == 0 && pcb.priority > process::PRIORITY_MIN {
                    pcb.priority -= 1;
                    promoted += 1;
                }
            }
        }

        if promoted > 0 {
            info!("[scheduler] aging applied, {} processes promoted", promoted);
        }

        promoted
    }

    /// Reconfigure the time quantum. Out-of-range values are logged and
    /// ignored; accepted values also reset the remaining quantum.
    pub fn set_quantum(&mut self, quantum: u32) {
        if (1..=MAX_QUANTUM).contains(&quantum) {
            self.time_quantum = quantum;
            self.current_quantum = quantum;
            info!("[scheduler] time quantum set to {} ticks", quantum);
        } else {
            warn!("[scheduler] invalid quantum value {}", quantum);
        }
    }

    pub fn quantum(&self) -> u32 {
        self.time_quantum
    }

    pub fn current_quantum(&self) -> u32 {
        self.current_quantum
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn switches(&self) -> u64 {
        self.context_switches
    }

    /// Emit scheduler statistics and a Ready-queue snapshot on the byte
    /// sink.
    pub fn print_stats(&self, table: &ProcessTable) {
        println!("\n========== SCHEDULER STATISTICS ==========");
        println!("System ticks: {}", self.ticks);
        println!("Context switches: {}", self.context_switches);
        println!("Current quantum: {} ticks", self.time_quantum);
        match table.current_pid() {
            Some(pid) => println!("Current process PID: {}", pid),
            None => println!("Current process PID: none"),
        }
        println!("\nReady processes:");
        for pcb in table.slots() {
            if pcb.state == ProcState::Ready && pcb.pid != 0 {
                println!(
                    "  PID {}: priority={}, age={}",
                    pcb.pid, pcb.priority, pcb.age
                );
            }
        }
        println!("=========================================\n");
    }
}

// ── Kernel singleton ────────────────────────────────────────────────

/// The kernel's scheduler.
static SCHED: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Reset the scheduler.
pub fn init() {
    SCHED.lock().init();
}

/// Timer collaborator entry point: account one tick, preempt on quantum
/// expiry, age periodically.
pub fn tick() {
    let frames = {
        let mut sched = SCHED.lock();
        process::with_table(|table| sched.tick(table))
    };
    dispatch(frames);
}

/// Switch to the next Ready process, if there is one.
pub fn context_switch() {
    let frames = {
        let mut sched = SCHED.lock();
        process::with_table(|table| sched.context_switch(table))
    };
    dispatch(frames);
}

fn dispatch(frames: Option<SwitchFrames>) {
    if let Some(frames) = frames {
        // The slots point into the static process table, so they remain
        // valid after the locks drop; single-core execution with
        // interrupts masked keeps the pair coherent across the swap.
        unsafe { switch::switch_context(frames) }
    }
}

/// Age every Ready process once.
pub fn apply_aging() -> u32 {
    let mut sched = SCHED.lock();
    process::with_table(|table| sched.apply_aging(table))
}

/// PID the scheduler would dispatch next, if any.
pub fn next_pid() -> Option<Pid> {
    let sched = SCHED.lock();
    process::with_table(|table| sched.next(table).map(|idx| table.slot(idx).pid))
}

/// Reconfigure the time quantum (accepted range `1..=MAX_QUANTUM`).
pub fn set_quantum(quantum: u32) {
    SCHED.lock().set_quantum(quantum);
}

/// The configured time quantum.
pub fn quantum() -> u32 {
    SCHED.lock().quantum()
}

/// Total context switches performed.
pub fn switches() -> u64 {
    SCHED.lock().switches()
}

/// Total timer ticks observed.
pub fn ticks() -> u64 {
    SCHED.lock().ticks()
}

/// Emit scheduler statistics on the byte sink.
pub fn print_stats() {
    let sched = SCHED.lock();
    process::with_table(|table| sched.print_stats(table));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryManager;

    extern "C" fn noop_task() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn setup() -> (MemoryManager, ProcessTable, Scheduler) {
        let mut mem = MemoryManager::new();
        mem.init();
        let mut table = ProcessTable::new();
        table.init();
        let mut sched = Scheduler::new();
        sched.init();
        (mem, table, sched)
    }

    fn spawn(mem: &mut MemoryManager, table: &mut ProcessTable, priority: u8) -> Pid {
        table.create(mem, noop_task, priority).unwrap()
    }

    fn running_count(table: &ProcessTable) -> usize {
        table
            .slots()
            .iter()
            .filter(|p| p.state == ProcState::Running)
            .count()
    }

    #[test]
    fn test_next_picks_smallest_priority_value() {
        let (mut mem, mut table, sched) = setup();
        spawn(&mut mem, &mut table, 10);
        let urgent = spawn(&mut mem, &mut table, 3);
        spawn(&mut mem, &mut table, 7);

        let idx = sched.next(&table).unwrap();
        assert_eq!(table.slot(idx).pid, urgent);
    }

    #[test]
    fn test_next_breaks_ties_by_table_order() {
        let (mut mem, mut table, sched) = setup();
        let first = spawn(&mut mem, &mut table, 5);
        spawn(&mut mem, &mut table, 5);

        let idx = sched.next(&table).unwrap();
        assert_eq!(table.slot(idx).pid, first);
    }

    #[test]
    fn test_next_skips_non_ready() {
        let (mut mem, mut table, sched) = setup();
        let blocked = spawn(&mut mem, &mut table, 1);
        let ready = spawn(&mut mem, &mut table, 9);
        table.set_state(blocked, ProcState::Blocked).unwrap();

        let idx = sched.next(&table).unwrap();
        assert_eq!(table.slot(idx).pid, ready);
    }

    #[test]
    fn test_next_none_when_nothing_ready() {
        let (mut mem, mut table, mut sched) = setup();
        assert!(sched.next(&table).is_none());
        assert!(sched.context_switch(&mut table).is_none());
        assert_eq!(sched.switches(), 0);

        let pid = spawn(&mut mem, &mut table, 5);
        table.set_state(pid, ProcState::Sleeping).unwrap();
        assert!(sched.next(&table).is_none());
    }

    #[test]
    fn test_first_dispatch_has_no_outgoing_frame() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 5);

        let frames = sched.context_switch(&mut table).unwrap();
        assert!(frames.outgoing.is_none());
        assert!(!frames.incoming.is_null());

        assert_eq!(table.current_pid(), Some(pid));
        assert_eq!(table.get_state(pid), ProcState::Running);
        assert_eq!(sched.switches(), 1);
        assert_eq!(sched.current_quantum(), sched.quantum());
    }

    #[test]
    fn test_switch_saves_outgoing_context() {
        let (mut mem, mut table, mut sched) = setup();
        let old = spawn(&mut mem, &mut table, 10);
        let new = spawn(&mut mem, &mut table, 2);

        table.set_current(old).unwrap();
        // The old task has yielded back to Ready; the urgent one wins.
        let frames = sched.context_switch(&mut table).unwrap();
        assert!(frames.outgoing.is_some());
        assert_eq!(table.current_pid(), Some(new));
        assert_eq!(table.get_state(new), ProcState::Running);
    }

    #[test]
    fn test_quantum_expiry_preempts_and_requeues() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 5);
        table.set_current(pid).unwrap();
        table.set_state(pid, ProcState::Running).unwrap();
        sched.set_quantum(2);

        assert!(sched.tick(&mut table).is_none());
        assert_eq!(sched.current_quantum(), 1);

        // Second tick expires the quantum; the sole Ready candidate is
        // the same process, so it is dispatched right back.
        let frames = sched.tick(&mut table).unwrap();
        assert_eq!(sched.switches(), 1);
        assert_eq!(table.get_state(pid), ProcState::Running);
        assert_eq!(sched.current_quantum(), 2);
        assert_eq!(frames.outgoing.unwrap() as *const u64, frames.incoming);
    }

    #[test]
    fn test_tick_leaves_non_running_current_alone() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 5);
        table.set_current(pid).unwrap();
        table.set_state(pid, ProcState::Blocked).unwrap();
        sched.set_quantum(1);

        assert!(sched.tick(&mut table).is_none());
        assert!(sched.tick(&mut table).is_none());
        assert_eq!(sched.switches(), 0);
        assert_eq!(sched.ticks(), 2);
    }

    #[test]
    fn test_at_most_one_running() {
        let (mut mem, mut table, mut sched) = setup();
        for priority in [9, 5, 5] {
            spawn(&mut mem, &mut table, priority);
        }
        sched.context_switch(&mut table);
        sched.set_quantum(1);

        for _ in 0..8 {
            sched.tick(&mut table);
            assert_eq!(running_count(&table), 1);
        }
    }

    #[test]
    fn test_exit_then_switch_moves_on() {
        let (mut mem, mut table, mut sched) = setup();
        let doomed = spawn(&mut mem, &mut table, 1);
        let survivor = spawn(&mut mem, &mut table, 10);

        table.set_current(doomed).unwrap();
        table.exit(&mut mem).unwrap();

        let frames = sched.context_switch(&mut table).unwrap();
        assert!(frames.outgoing.is_some());
        assert_eq!(table.current_pid(), Some(survivor));
        assert_eq!(table.get_state(doomed), ProcState::Terminated);
    }

    #[test]
    fn test_aging_promotes_every_tenth_cycle() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 15);

        for cycle in 1..=9 {
            assert_eq!(sched.apply_aging(&mut table), 0);
            let pcb = table.get(pid).unwrap();
            assert_eq!(pcb.age, cycle);
            assert_eq!(pcb.priority, 15);
        }

        assert_eq!(sched.apply_aging(&mut table), 1);
        let pcb = table.get(pid).unwrap();
        assert_eq!(pcb.age, 10);
        assert_eq!(pcb.priority, 14);
    }

    #[test]
    fn test_aging_never_passes_the_floor() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 1);

        for _ in 0..20 {
            assert_eq!(sched.apply_aging(&mut table), 0);
        }
        assert_eq!(table.get(pid).unwrap().priority, 1);
        assert_eq!(table.get(pid).unwrap().age, 20);
    }

    #[test]
    fn test_aging_skips_non_ready() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 15);
        table.set_state(pid, ProcState::Blocked).unwrap();

        sched.apply_aging(&mut table);
        assert_eq!(table.get(pid).unwrap().age, 0);
    }

    #[test]
    fn test_ticks_drive_aging_at_threshold() {
        let (mut mem, mut table, mut sched) = setup();
        let pid = spawn(&mut mem, &mut table, 15);

        for _ in 0..AGING_THRESHOLD - 1 {
            sched.tick(&mut table);
        }
        assert_eq!(table.get(pid).unwrap().age, 0);

        sched.tick(&mut table);
        assert_eq!(table.get(pid).unwrap().age, 1);
    }

    #[test]
    fn test_set_quantum_bounds() {
        let (_, _, mut sched) = setup();
        sched.set_quantum(0);
        assert_eq!(sched.quantum(), DEFAULT_QUANTUM);
        sched.set_quantum(MAX_QUANTUM + 1);
        assert_eq!(sched.quantum(), DEFAULT_QUANTUM);

        sched.set_quantum(1);
        assert_eq!(sched.quantum(), 1);
        sched.set_quantum(MAX_QUANTUM);
        assert_eq!(sched.quantum(), MAX_QUANTUM);

        sched.set_quantum(25);
        assert_eq!(sched.quantum(), 25);
        assert_eq!(sched.current_quantum(), 25);
    }

    #[test]
    fn test_init_is_idempotent() {
        let (mut mem, mut table, mut sched) = setup();
        spawn(&mut mem, &mut table, 5);
        sched.set_quantum(3);
        sched.context_switch(&mut table);
        sched.tick(&mut table);

        sched.init();
        sched.init();
        assert_eq!(sched.quantum(), DEFAULT_QUANTUM);
        assert_eq!(sched.ticks(), 0);
        assert_eq!(sched.switches(), 0);
    }
}
