//! The process table: a fixed-size array of [`Process`] slots guarded by a
//! single lock, plus the pid/tgid allocators and the stride bookkeeping
//! shared across every slot.
//!
//! One lock covers the whole table rather than one lock per process,
//! matching the original xv6 `ptable.lock` discipline: every state
//! transition, every scan for a child or a sleeper, and the scheduler's own
//! dispatch loop all hold the same lock. This keeps `sleep`/`wakeup`'s
//! "atomically release and re-acquire" contract simple at the cost of one
//! lock being hot across CPUs, a tradeoff classic xv6 and this crate both
//! accept.

use crate::cpu::{pop_intr_off, push_intr_off, Cpu, Cpus};
use crate::param::NPROC;
use crate::proc::process::Process;

pub type Slot = usize;

/// A wait channel: any stable address-sized tag two parties can agree on.
/// The original C code sleeps on arbitrary pointers; slots sleep on a
/// `u64` tag instead so nothing here needs raw pointers into collaborator
/// memory.
pub type Chan = u64;

/// The wait channel a slot sleeps on to wait for itself: used by `wait()`
/// to wake on a reaped child and by `thread_join()` to wake on a thread's
/// exit, both of which wait on their own slot rather than a shared chan.
pub fn self_chan(slot: Slot) -> Chan {
    slot as u64 + 1
}

pub struct ProcTable {
    pub procs: [Process; NPROC],
    next_pid: i32,
    next_tgid: u32,
    pub stride: crate::proc::stride::StrideSet,
}

impl ProcTable {
    pub const fn new() -> ProcTable {
        ProcTable {
            procs: [const { Process::new() }; NPROC],
            next_pid: 1,
            next_tgid: 1,
            stride: crate::proc::stride::StrideSet::new(),
        }
    }

    pub fn alloc_pid(&mut self) -> i32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub fn alloc_tgid(&mut self) -> u32 {
        let tgid = self.next_tgid;
        self.next_tgid += 1;
        tgid
    }

    pub fn find_by_pid(&self, pid: i32) -> Option<Slot> {
        self.procs.iter().position(|p| p.pid == pid && !p.is_unused())
    }

    /// Recompute every admitted stride process's `pass` baseline after the
    /// stride set's membership changed (a stride process exited or was
    /// reaped). Grounded on `set_stride()`'s whole-table LCM recomputation.
    pub fn recompute_stride(&mut self) {
        let members: arrayvec::ArrayVec<(Slot, u32), NPROC> = self
            .procs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_stride && !p.is_unused())
            .map(|(i, p)| (i, p.share))
            .collect();
        self.stride.rebuild(&members);
    }
}
impl Default for ProcTable {
    fn default() -> ProcTable {
        ProcTable::new()
    }
}

/// The table lock: a spinlock over [`ProcTable`] that also disables local
/// interrupts for the duration of the hold, since the scheduler and the
/// timer tick handler both touch the table from interrupt context.
pub struct TableLock {
    inner: crate::sync::Spinlock<ProcTable>,
}
impl TableLock {
    pub const fn new() -> TableLock {
        TableLock {
            inner: crate::sync::Spinlock::new(ProcTable::new()),
        }
    }

    pub fn lock(&self, cpu: &mut Cpu) -> TableGuard<'_> {
        push_intr_off(cpu);
        TableGuard {
            guard: self.inner.lock(),
        }
    }
}
impl Default for TableLock {
    fn default() -> TableLock {
        TableLock::new()
    }
}

pub struct TableGuard<'l> {
    guard: crate::sync::spinlock::SpinlockGuard<'l, ProcTable>,
}
impl<'l> core::ops::Deref for TableGuard<'l> {
    type Target = ProcTable;
    fn deref(&self) -> &ProcTable {
        &self.guard
    }
}
impl<'l> core::ops::DerefMut for TableGuard<'l> {
    fn deref_mut(&mut self) -> &mut ProcTable {
        &mut self.guard
    }
}

pub static TABLE: TableLock = TableLock::new();
pub static CPUS: crate::sync::Spinlock<Cpus> = crate::sync::Spinlock::new(Cpus::new());

/// Drop the table-held interrupt-disable layer acquired by [`TableLock::lock`].
/// Callers must pass the same `cpu` they locked with, after the guard has
/// been dropped.
pub fn unlock_interrupts(cpu: &mut Cpu) {
    pop_intr_off(cpu);
}

#[cfg(test)]
pub fn reset_for_test() -> std::sync::MutexGuard<'static, ()> {
    static TEST_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let guard = match TEST_GUARD.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    *TABLE.inner.lock() = ProcTable::new();
    guard
}
