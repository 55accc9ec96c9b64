//! The per-CPU dispatch loop: pick a process via stride or MLFQ, hand it
//! the CPU, and fold its accounting back into the table when it gives the
//! CPU back. Also the `sleep`/`wakeup` coupling and `sched`/`yield`, both
//! of which must only ever be called with the table lock held.
//!
//! Grounded on `scheduler()`/`sched()`/`yield()`/`sleep()`/`wakeup()` in the
//! original xv6-public `proc.c`. The outer stride-vs-MLFQ branch there is
//! the `scheduler()` for-loop's `stride_index == num_stride` check; it is
//! reproduced here as [`Scheduler::run_once`]'s stride/MLFQ split, with the
//! original's busy-wait-on-empty-MLFQ loop surfaced as an observable
//! [`DispatchOutcome::BusyWaitOneTick`] instead of an actual spin so it is
//! testable without a timer.

use crate::proc::mlfq;
use crate::proc::process::ProcState;
use crate::proc::table::{Chan, ProcTable, Slot};

pub struct Scheduler {
    last_mlfq_dispatch: Option<Slot>,
}
impl Scheduler {
    pub const fn new() -> Scheduler {
        Scheduler {
            last_mlfq_dispatch: None,
        }
    }

    /// Choose the next process to run, without actually switching to it
    /// (the context switch is the caller's job once it holds the table
    /// lock and has transitioned the chosen slot to RUNNING). For an MLFQ
    /// dispatch the level is chosen from the leader, then
    /// [`ProcTable::pick_group_member`] resolves which member of its group
    /// (the leader itself, or one of its threads) actually runs; the
    /// round-robin cursor tracked here stays keyed on the leader slot.
    pub fn run_once(&mut self, table: &mut ProcTable) -> DispatchOutcome {
        if let Some(slot) = table.stride.pick() {
            return DispatchOutcome::Dispatch(slot, DispatchClass::Stride);
        }

        match mlfq::maxlev(table) {
            Some(level) => {
                let after = self
                    .last_mlfq_dispatch
                    .filter(|&s| table.procs[s].mlfqlev == level);
                match mlfq::pick_at_level(table, level, after) {
                    Some(leader) => {
                        self.last_mlfq_dispatch = Some(leader);
                        match table.pick_group_member(leader) {
                            Some(slot) => DispatchOutcome::Dispatch(slot, DispatchClass::Mlfq),
                            None => DispatchOutcome::BusyWaitOneTick,
                        }
                    }
                    None => DispatchOutcome::BusyWaitOneTick,
                }
            }
            None => DispatchOutcome::BusyWaitOneTick,
        }
    }

    /// The slot whose `mlfqlev`/allotment this dispatch's accounting belongs
    /// to: `slot` itself, unless it's a thread, in which case its leader.
    fn accounting_slot(table: &ProcTable, slot: Slot) -> Slot {
        if table.procs[slot].is_thread {
            table
                .group_leader_of(table.procs[slot].tgid)
                .unwrap_or(slot)
        } else {
            slot
        }
    }

    /// Ticks granted to this dispatch before the outer loop reconsiders, per
    /// [`mlfq::local_ticks_for_level`]. Stride dispatches have no separate
    /// per-turn quantum of their own; they run until they yield, sleep, or
    /// the scheduler is re-entered.
    pub fn quantum_ticks(&self, table: &ProcTable, slot: Slot, class: DispatchClass) -> Option<u32> {
        match class {
            DispatchClass::Mlfq => {
                let level = table.procs[Self::accounting_slot(table, slot)].mlfqlev;
                Some(mlfq::local_ticks_for_level(
                    level,
                    !table.stride.members.is_empty(),
                ))
            }
            DispatchClass::Stride => None,
        }
    }

    /// Record that `slot` ran for one tick, updating stride pass or MLFQ
    /// allotment as appropriate for the class it was dispatched under. An
    /// MLFQ tick run by a thread is charged against its leader, since
    /// `mlfqlev`/`allotment` live on the leader, not on the thread.
    pub fn account_tick(&mut self, table: &mut ProcTable, slot: Slot, class: DispatchClass) {
        match class {
            DispatchClass::Stride => table.stride.advance(slot),
            DispatchClass::Mlfq => {
                table.stride.advance_mlfq();
                let charge_slot = Self::accounting_slot(table, slot);
                mlfq::charge_tick(&mut table.procs[charge_slot]);
            }
        }
    }
}
impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchClass {
    Stride,
    Mlfq,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatch(Slot, DispatchClass),
    /// No RUNNABLE process anywhere; the caller should wait for the next
    /// tick and try again (the original's `while(ticks == empty_mlfq)`
    /// busy-wait, made observable instead of spun).
    BusyWaitOneTick,
}

/// `sched()`: must be called with the table lock held, the calling slot's
/// state already changed away from RUNNING, and exactly one nested
/// interrupt-disable layer held on this CPU. Returns the saved/restored
/// `previous_interrupts_enabled` flag the caller must write back after the
/// context switch it performs.
pub fn sched(table: &ProcTable, slot: Slot, cpu: &crate::cpu::Cpu) -> bool {
    if cpu.interrupt_disable_layers != 1 {
        panic!("sched locks");
    }
    if table.procs[slot].state == ProcState::Running {
        panic!("sched running");
    }
    cpu.previous_interrupts_enabled
}

/// Give up the CPU for one scheduling round.
pub fn yield_now(table: &mut ProcTable, slot: Slot) {
    table.procs[slot].state = ProcState::Runnable;
}

/// Atomically mark the current process SLEEPING on `chan`; the table lock
/// must be held across this call and the subsequent `sched()` so no wakeup
/// is missed between checking the condition and going to sleep.
pub fn sleep(table: &mut ProcTable, slot: Slot, chan: Chan) {
    table.procs[slot].chan = Some(chan);
    table.procs[slot].state = ProcState::Sleeping;
    if table.procs[slot].is_thread {
        if let Some(leader) = table.group_leader_of(table.procs[slot].tgid) {
            table.procs[leader].num_sleeping_thread += 1;
        }
    }
}

/// Wake every process sleeping on `chan`. A promoted thread PCB decrements
/// its leader's `num_sleeping_thread` as it wakes.
pub fn wakeup(table: &mut ProcTable, chan: Chan) {
    for i in 0..table.procs.len() {
        if table.procs[i].state == ProcState::Sleeping && table.procs[i].chan == Some(chan) {
            table.procs[i].state = ProcState::Runnable;
            table.procs[i].chan = None;
            if table.procs[i].is_thread {
                if let Some(leader) = table.group_leader_of(table.procs[i].tgid) {
                    table.procs[leader].num_sleeping_thread =
                        table.procs[leader].num_sleeping_thread.saturating_sub(1);
                }
            }
        }
    }
}
