//! User-level threads: processes that share their creator's address space
//! and file table but keep their own kernel stack, PCB slot, and
//! scheduling state. `tgid` is the group key; the leader's `prev_thread`
//! is the round-robin cursor the sub-scheduler resumes from, not an
//! ownership link.
//!
//! Grounded on `thread_create()`/`thread_exit()`/`thread_join()` in the
//! original xv6-public `proc.c`. `thread_join`'s original dereferences the
//! last PCB it scanned when the given `tid` doesn't match any thread; this
//! version reports [`ProcError::NoSuchThread`] instead.

use crate::collab;
use crate::param::NPROC;
use crate::proc::process::{ProcError, ProcState};
use crate::proc::table::{ProcTable, Slot};

impl ProcTable {
    /// Spin up a new thread in the same thread group as `creator`. The new
    /// thread shares `creator`'s pagetable, open files, and cwd, gets a
    /// fresh kernel stack, and starts at `entry` with `arg` as its single
    /// argument (argument/entry-point wiring into the trapframe is a
    /// collaborator concern; only the table/allotment bookkeeping lives
    /// here).
    pub fn thread_create(
        &mut self,
        creator: Slot,
        entry_pc: u64,
        arg: u64,
        stack_top: u64,
    ) -> Result<i32, ProcError> {
        let child = self.alloc().map_err(|_| ProcError::Allocation)?;

        let pagetable = self.procs[creator].pagetable;
        self.procs[child].pagetable = pagetable;
        let old_sz = self.procs[creator].sz;
        self.procs[child].sz = old_sz;
        self.procs[child].old_sz = old_sz;
        self.procs[child].name = self.procs[creator].name;

        for fd in 0..self.procs[creator].open_files.len() {
            if let Some(f) = self.procs[creator].open_files[fd] {
                self.procs[child].open_files[fd] = Some(unsafe { collab::filedup(f) });
            }
        }
        if let Some(cwd) = self.procs[creator].cwd {
            self.procs[child].cwd = Some(unsafe { collab::idup(cwd) });
        }

        // The leader itself is never marked `is_thread`: it keeps its own
        // real `mlfqlev` and is the slot `group_leader_of` resolves back to
        // for accounting, no matter which group member actually dispatched.
        let tgid = if self.procs[creator].tgid != 0 {
            self.procs[creator].tgid
        } else {
            let tgid = self.alloc_tgid();
            self.procs[creator].tgid = tgid;
            tgid
        };
        self.procs[child].tgid = tgid;
        self.procs[child].is_thread = true;
        self.procs[child].parent = Some(creator);
        // Threads aren't independently chosen by maxlev()/pick_at_level();
        // they only run when their leader's level is picked and the group's
        // round-robin sub-loop lands on them.
        self.procs[child].mlfqlev = crate::param::MLFQLEV_STRIDE;

        self.procs[child].context.ra = entry_pc;
        self.procs[child].context.sp = stack_top;
        self.procs[child].context.s0 = arg;

        if self.procs[creator].num_thread == 0 {
            self.procs[creator].prev_thread = None;
        }
        self.procs[creator].num_thread += 1;
        self.procs[child].state = crate::proc::process::ProcState::Runnable;

        let pid = self.procs[child].pid;
        Ok(pid)
    }

    /// Tear down a thread's share of its group: mark it a zombie, decrement
    /// its leader's `num_thread`, and wake the leader in case it's already
    /// blocked in `thread_join`. A non-thread calling this is a fatal
    /// contract violation, not a recoverable error.
    pub fn thread_exit(&mut self, slot: Slot, retval: i64) {
        if !self.procs[slot].is_thread {
            panic!("thread_exit on a non-thread slot");
        }
        self.procs[slot].retval = retval;
        self.procs[slot].exit_status = 0;
        self.procs[slot].state = crate::proc::process::ProcState::Zombie;

        let tgid = self.procs[slot].tgid;
        if let Some(leader) = self.group_leader_of(tgid) {
            self.procs[leader].num_thread -= 1;
            crate::proc::scheduler::wakeup(self, crate::proc::table::self_chan(leader));
        }
    }

    /// Wait for the thread with pid `tid` in the same group as `waiter` to
    /// exit, reap it, and return its return value. A target that exists but
    /// hasn't reached ZOMBIE yet reports [`ProcError::NotYetExited`]; callers
    /// sleep on their own slot and retry, mirroring `wait()`'s retry pattern.
    pub fn thread_join(&mut self, waiter: Slot, tid: i32) -> Result<i64, ProcError> {
        let tgid = self.procs[waiter].tgid;
        let target = self
            .procs
            .iter()
            .position(|p| p.pid == tid && p.tgid == tgid && p.is_thread);

        let target = match target {
            Some(t) => t,
            None => return Err(ProcError::NoSuchThread),
        };

        if self.procs[target].state != crate::proc::process::ProcState::Zombie {
            return Err(ProcError::NotYetExited);
        }

        let retval = self.procs[target].retval;
        // The thread's pagetable is shared with the group, not owned by
        // it, so `free` must not tear it down here.
        self.procs[target].pagetable = None;
        self.free(target);

        if self.procs[waiter].num_thread == 0 {
            self.procs[waiter].tgid = 0;
            self.procs[waiter].sz = self.procs[waiter].old_sz;
        }

        Ok(retval)
    }

    /// The non-thread PCB carrying `tgid`, i.e. the leader whose `mlfqlev`
    /// and allotment govern every thread in its group. `None` if `tgid` is 0
    /// (no group) or the leader slot has since been freed.
    pub fn group_leader_of(&self, tgid: u32) -> Option<Slot> {
        if tgid == 0 {
            return None;
        }
        self.procs.iter().position(|p| p.tgid == tgid && !p.is_thread)
    }

    /// True if `leader` itself is RUNNABLE, or any thread in its group is --
    /// the eligibility test a leader with live threads needs instead of a
    /// plain RUNNABLE check on itself.
    pub fn group_has_runnable_member(&self, leader: Slot) -> bool {
        let p = &self.procs[leader];
        if p.state == ProcState::Runnable {
            return true;
        }
        if p.num_thread == 0 {
            return false;
        }
        self.procs
            .iter()
            .any(|t| t.is_thread && t.tgid == p.tgid && t.state == ProcState::Runnable)
    }

    /// The thread sub-scheduler: once the outer loop has chosen `leader`'s
    /// level, pick which member of its group actually runs this turn --
    /// round-robin among RUNNABLE threads starting just after
    /// `leader.prev_thread`, falling back to the leader itself. Advances
    /// the cursor as a side effect.
    pub fn pick_group_member(&mut self, leader: Slot) -> Option<Slot> {
        if self.procs[leader].num_thread == 0 {
            return if self.procs[leader].state == ProcState::Runnable {
                Some(leader)
            } else {
                None
            };
        }

        let tgid = self.procs[leader].tgid;
        let start = self.procs[leader].prev_thread.map(|s| (s + 1) % NPROC).unwrap_or(0);
        let found = (0..NPROC).map(|offset| (start + offset) % NPROC).find(|&i| {
            self.procs[i].is_thread && self.procs[i].tgid == tgid && self.procs[i].state == ProcState::Runnable
        });
        if let Some(slot) = found {
            self.procs[leader].prev_thread = Some(slot);
            return Some(slot);
        }
        if self.procs[leader].state == ProcState::Runnable {
            return Some(leader);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::process::ProcState;

    #[test]
    fn thread_create_shares_group_and_pagetable() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        t.procs[main].sz = 4096;
        let tid = t.thread_create(main, 0x1000, 42, 0x8000).unwrap();
        let thread_slot = t.procs.iter().position(|p| p.pid == tid).unwrap();
        assert_eq!(t.procs[thread_slot].pagetable, t.procs[main].pagetable);
        assert_eq!(t.procs[thread_slot].tgid, t.procs[main].tgid);
        assert_eq!(t.procs[thread_slot].state, ProcState::Runnable);
        assert_eq!(t.procs[main].num_thread, 1);
    }

    #[test]
    fn join_unknown_tid_errors_instead_of_dereferencing() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        t.thread_create(main, 0, 0, 0).unwrap();
        assert_eq!(t.thread_join(main, 999_999), Err(ProcError::NoSuchThread));
    }

    #[test]
    fn join_reaps_exited_thread_and_returns_retval() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        let tid = t.thread_create(main, 0, 0, 0).unwrap();
        let thread_slot = t.procs.iter().position(|p| p.pid == tid).unwrap();
        t.thread_exit(thread_slot, 7);
        let retval = t.thread_join(main, tid).unwrap();
        assert_eq!(retval, 7);
        assert!(t.procs[thread_slot].is_unused());
        assert_eq!(t.procs[main].num_thread, 0);
        assert!(!t.procs[main].is_thread);
    }

    #[test]
    #[should_panic]
    fn thread_exit_on_non_thread_panics() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        t.thread_exit(main, 0);
    }

    #[test]
    fn thread_exit_decrements_leader_num_thread_and_wakes_it() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        let tid = t.thread_create(main, 0, 0, 0).unwrap();
        let thread_slot = t.procs.iter().position(|p| p.pid == tid).unwrap();
        t.procs[main].state = ProcState::Sleeping;
        t.procs[main].chan = Some(crate::proc::table::self_chan(main));

        t.thread_exit(thread_slot, 3);

        assert_eq!(t.procs[main].num_thread, 0);
        assert_eq!(t.procs[main].state, ProcState::Runnable);
        assert_eq!(t.procs[main].chan, None);
    }

    #[test]
    fn join_before_exit_reports_not_yet_exited() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        let tid = t.thread_create(main, 0, 0, 0).unwrap();
        assert_eq!(t.thread_join(main, tid), Err(ProcError::NotYetExited));
    }

    #[test]
    fn new_thread_is_not_independently_mlfq_scheduled() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        let tid = t.thread_create(main, 0, 0, 0).unwrap();
        let thread_slot = t.procs.iter().position(|p| p.pid == tid).unwrap();
        assert_eq!(t.procs[thread_slot].mlfqlev, crate::param::MLFQLEV_STRIDE);
        assert!(t.procs[thread_slot].is_thread);
        assert!(!t.procs[main].is_thread);
    }

    #[test]
    fn group_leader_of_resolves_back_to_the_non_thread_slot() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        t.thread_create(main, 0, 0, 0).unwrap();
        let tgid = t.procs[main].tgid;
        assert_eq!(t.group_leader_of(tgid), Some(main));
        assert_eq!(t.group_leader_of(0), None);
    }

    #[test]
    fn leader_sleeping_with_runnable_thread_is_group_eligible() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        let tid = t.thread_create(main, 0, 0, 0).unwrap();
        let thread_slot = t.procs.iter().position(|p| p.pid == tid).unwrap();
        t.procs[main].state = ProcState::Sleeping;
        t.procs[thread_slot].state = ProcState::Runnable;
        assert!(t.group_has_runnable_member(main));
    }

    #[test]
    fn round_robin_cycles_through_three_threads_before_repeating() {
        let mut t = ProcTable::new();
        let main = t.alloc().unwrap();
        t.procs[main].state = ProcState::Sleeping;
        let tids: arrayvec::ArrayVec<i32, 3> = (0..3u64)
            .map(|i| t.thread_create(main, 0, i, 0).unwrap())
            .collect();
        let slots: arrayvec::ArrayVec<Slot, 3> = tids
            .iter()
            .map(|&tid| t.procs.iter().position(|p| p.pid == tid).unwrap())
            .collect();

        let first = t.pick_group_member(main).unwrap();
        let second = t.pick_group_member(main).unwrap();
        let third = t.pick_group_member(main).unwrap();
        let fourth = t.pick_group_member(main).unwrap();
        assert_eq!([first, second, third], [slots[0], slots[1], slots[2]]);
        assert_eq!(fourth, slots[0]);
    }
}
