//! The syscall surface backed directly by [`crate::proc`]: `fork`, `exit`,
//! `wait`, `kill`, `yield`, `sleep`, `wakeup`, `getppid`, `growproc`,
//! `set_cpu_share`, `thread_create`, `thread_exit`, `thread_join`.
//!
//! Each syscall is a thin wrapper that decodes its arguments (a collaborator concern --
//! `argint`/`argaddr` read out of the trapframe, out of scope here) and
//! calls straight into the table. The table lock is acquired and released
//! within each wrapper; none of them hold it across a sleep.

use crate::collab;
use crate::proc::process::ProcError;
use crate::proc::table::{self_chan, Slot, TABLE};

pub fn sys_fork(cpu: &mut crate::cpu::Cpu, current: Slot) -> Result<i32, ProcError> {
    let mut table = TABLE.lock(cpu);
    let result = table.fork(current);
    crate::proc::table::unlock_interrupts(cpu);
    result
}

pub fn sys_exit(cpu: &mut crate::cpu::Cpu, current: Slot, init: Slot, status: i32) {
    let mut table = TABLE.lock(cpu);
    let wakeups = table.begin_exit(current, init, status);
    if let Some(parent) = wakeups.parent {
        crate::proc::scheduler::wakeup(&mut table, self_chan(parent));
    }
    if wakeups.wake_init {
        crate::proc::scheduler::wakeup(&mut table, self_chan(init));
    }
    crate::proc::table::unlock_interrupts(cpu);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Reaped(i32, i32),
    /// Caller has children but none have exited yet; it should sleep on
    /// itself and retry once woken (the wakeup comes from `begin_exit`'s
    /// reparent-to-init path, or directly from the exiting child).
    ShouldSleep,
    NoChildren,
    Killed,
}

pub fn sys_wait(cpu: &mut crate::cpu::Cpu, current: Slot) -> WaitOutcome {
    let mut table = TABLE.lock(cpu);
    let outcome = match table.reap_zombie_child(current) {
        Ok((_, pid, status)) => WaitOutcome::Reaped(pid, status),
        Err(ProcError::NoChildren) if table.has_any_child(current) => WaitOutcome::ShouldSleep,
        Err(ProcError::NoChildren) => WaitOutcome::NoChildren,
        Err(ProcError::Killed) => WaitOutcome::Killed,
        Err(_) => WaitOutcome::NoChildren,
    };
    if outcome == WaitOutcome::ShouldSleep {
        crate::proc::scheduler::sleep(&mut table, current, self_chan(current));
    }
    crate::proc::table::unlock_interrupts(cpu);
    outcome
}

pub fn sys_kill(cpu: &mut crate::cpu::Cpu, pid: i32) -> bool {
    let mut table = TABLE.lock(cpu);
    let found = table.kill(pid);
    crate::proc::table::unlock_interrupts(cpu);
    found
}

pub fn sys_yield(cpu: &mut crate::cpu::Cpu, current: Slot) {
    let mut table = TABLE.lock(cpu);
    crate::proc::scheduler::yield_now(&mut table, current);
    crate::proc::table::unlock_interrupts(cpu);
}

/// Put `current` to sleep on `chan`. The original takes a second lock to
/// release atomically with acquiring the table lock; every caller here
/// already holds the table lock for the whole wrapper, so that half of the
/// contract collapses to nothing left to release.
pub fn sys_sleep(cpu: &mut crate::cpu::Cpu, current: Slot, chan: u64) {
    let mut table = TABLE.lock(cpu);
    crate::proc::scheduler::sleep(&mut table, current, chan);
    crate::proc::table::unlock_interrupts(cpu);
}

pub fn sys_wakeup(cpu: &mut crate::cpu::Cpu, chan: u64) {
    let mut table = TABLE.lock(cpu);
    crate::proc::scheduler::wakeup(&mut table, chan);
    crate::proc::table::unlock_interrupts(cpu);
}

pub fn sys_getppid(cpu: &mut crate::cpu::Cpu, current: Slot) -> i32 {
    let table = TABLE.lock(cpu);
    let ppid = table.getppid(current);
    crate::proc::table::unlock_interrupts(cpu);
    ppid
}

pub fn sys_growproc(cpu: &mut crate::cpu::Cpu, current: Slot, delta: i64) -> Result<(), ProcError> {
    let mut table = TABLE.lock(cpu);
    let result = table.growproc(current, delta);
    crate::proc::table::unlock_interrupts(cpu);
    result
}

/// Admit `current` into the stride class at `share` percent, rejecting the
/// request if it would starve MLFQ below its guaranteed minimum.
pub fn sys_set_cpu_share(cpu: &mut crate::cpu::Cpu, current: Slot, share: u32) -> Result<(), ProcError> {
    let mut table = TABLE.lock(cpu);
    if !table.stride.can_admit(share) {
        crate::proc::table::unlock_interrupts(cpu);
        return Err(ProcError::OverSubscribed);
    }
    table.stride.admit(current, share);
    table.procs[current].is_stride = true;
    table.procs[current].share = share;
    table.procs[current].mlfqlev = crate::param::MLFQLEV_STRIDE;
    crate::proc::table::unlock_interrupts(cpu);
    Ok(())
}

pub fn sys_thread_create(
    cpu: &mut crate::cpu::Cpu,
    creator: Slot,
    entry_pc: u64,
    arg: u64,
    stack_top: u64,
) -> Result<i32, ProcError> {
    let mut table = TABLE.lock(cpu);
    let result = table.thread_create(creator, entry_pc, arg, stack_top);
    crate::proc::table::unlock_interrupts(cpu);
    result
}

/// `thread_exit` never returns to its caller in the normal sense (the
/// exiting thread switches away to the scheduler); a non-thread calling it
/// is a fatal contract violation, not a recoverable error, so this panics
/// rather than returning a `Result`.
pub fn sys_thread_exit(cpu: &mut crate::cpu::Cpu, current: Slot, retval: i64) {
    let mut table = TABLE.lock(cpu);
    table.thread_exit(current, retval);
    crate::proc::table::unlock_interrupts(cpu);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadJoinOutcome {
    Reaped(i64),
    /// The named thread exists but hasn't reached ZOMBIE yet; the caller
    /// should sleep on its own slot and retry once woken (the wakeup comes
    /// from `thread_exit`).
    ShouldSleep,
    NoSuchThread,
}

pub fn sys_thread_join(cpu: &mut crate::cpu::Cpu, waiter: Slot, tid: i32) -> ThreadJoinOutcome {
    let mut table = TABLE.lock(cpu);
    let outcome = match table.thread_join(waiter, tid) {
        Ok(retval) => ThreadJoinOutcome::Reaped(retval),
        Err(ProcError::NotYetExited) => ThreadJoinOutcome::ShouldSleep,
        Err(_) => ThreadJoinOutcome::NoSuchThread,
    };
    if outcome == ThreadJoinOutcome::ShouldSleep {
        crate::proc::scheduler::sleep(&mut table, waiter, self_chan(waiter));
    }
    crate::proc::table::unlock_interrupts(cpu);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::proc::process::ProcState;
    use crate::proc::table::reset_for_test;

    fn alloc_running() -> (Cpu, Slot) {
        let mut cpu = Cpu::new();
        let slot = {
            let mut table = TABLE.lock(&mut cpu);
            let slot = table.alloc().unwrap();
            table.procs[slot].state = ProcState::Runnable;
            slot
        };
        crate::proc::table::unlock_interrupts(&mut cpu);
        (cpu, slot)
    }

    #[test]
    fn fork_then_wait_reaps_child() {
        let _serialize = reset_for_test();
        let (mut cpu, parent) = alloc_running();

        let child_pid = sys_fork(&mut cpu, parent).unwrap();
        assert!(child_pid > 0);

        {
            let mut table = TABLE.lock(&mut cpu);
            let child_slot = table.find_by_pid(child_pid).unwrap();
            table.procs[child_slot].state = ProcState::Zombie;
        }
        crate::proc::table::unlock_interrupts(&mut cpu);

        match sys_wait(&mut cpu, parent) {
            WaitOutcome::Reaped(pid, _status) => assert_eq!(pid, child_pid),
            other => panic!("expected Reaped, got {other:?}"),
        }
    }

    #[test]
    fn wait_with_live_child_sleeps_instead_of_erroring() {
        let _serialize = reset_for_test();
        let (mut cpu, parent) = alloc_running();
        sys_fork(&mut cpu, parent).unwrap();

        assert_eq!(sys_wait(&mut cpu, parent), WaitOutcome::ShouldSleep);
    }

    #[test]
    fn set_cpu_share_then_over_budget_rejected() {
        let _serialize = reset_for_test();
        let (mut cpu, slot) = alloc_running();

        sys_set_cpu_share(&mut cpu, slot, 50).unwrap();
        let (_, other) = alloc_running();
        assert_eq!(
            sys_set_cpu_share(&mut cpu, other, 31),
            Err(ProcError::OverSubscribed)
        );
    }

    #[test]
    fn thread_create_then_join_round_trips() {
        let _serialize = reset_for_test();
        let (mut cpu, main) = alloc_running();

        let tid = sys_thread_create(&mut cpu, main, 0x1000, 7, 0x9000).unwrap();
        let slot = {
            let table = TABLE.lock(&mut cpu);
            let slot = table.find_by_pid(tid).unwrap();
            drop(table);
            crate::proc::table::unlock_interrupts(&mut cpu);
            slot
        };
        sys_thread_exit(&mut cpu, slot, 99);

        assert_eq!(
            sys_thread_join(&mut cpu, main, tid),
            ThreadJoinOutcome::Reaped(99)
        );
    }

    #[test]
    fn sleep_then_wakeup_via_syscalls_round_trips() {
        let _serialize = reset_for_test();
        let (mut cpu, slot) = alloc_running();
        sys_sleep(&mut cpu, slot, 7);
        assert_eq!(
            TABLE.lock(&mut cpu).procs[slot].state,
            ProcState::Sleeping
        );
        crate::proc::table::unlock_interrupts(&mut cpu);

        sys_wakeup(&mut cpu, 7);
        assert_eq!(
            TABLE.lock(&mut cpu).procs[slot].state,
            ProcState::Runnable
        );
        crate::proc::table::unlock_interrupts(&mut cpu);
    }

    #[test]
    fn kill_marks_victim() {
        let _serialize = reset_for_test();
        let (mut cpu, slot) = alloc_running();
        let pid = {
            let table = TABLE.lock(&mut cpu);
            let pid = table.procs[slot].pid;
            drop(table);
            crate::proc::table::unlock_interrupts(&mut cpu);
            pid
        };
        assert!(sys_kill(&mut cpu, pid));
        assert!(!sys_kill(&mut cpu, 999_999));
    }
}

/// Dump every live process to the console: pid, state, name. Grounded on
/// `procdump()`; the original's 10-deep saved-PC backtrace needs a real
/// stack to walk, so it is sourced from the [`collab::walk_stack`]
/// collaborator rather than reimplemented here.
pub fn procdump(cpu: &mut crate::cpu::Cpu) {
    let table = TABLE.lock(cpu);
    for p in table.procs.iter().filter(|p| !p.is_unused()) {
        let name = core::str::from_utf8(&p.name).unwrap_or("?");
        crate::console::println!("{} {:?} {}", p.pid, p.state, name.trim_end_matches('\0'));
        let mut pcs = [0u64; 10];
        let n = unsafe { collab::walk_stack(p.context.sp, &mut pcs as *mut [u64; 10]) };
        for pc in &pcs[..n] {
            crate::console::println!("  {:#x}", pc);
        }
    }
    crate::proc::table::unlock_interrupts(cpu);
}
