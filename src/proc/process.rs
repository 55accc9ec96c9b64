//! The process control block and the Unix-ish syscalls layered directly on
//! it: `fork`, `exit`, `wait`, `kill`, `growproc`, `getppid`.
//!
//! `parent`/`prev_thread` are table-slot indices rather than raw pointers,
//! avoiding unsafe pointer-chasing across the table. `wait`'s stride-table
//! recomputation on reaping a stride child, and `exit`'s reparenting-to-init,
//! follow the original xv6 process model.

use crate::collab::{self, FileHandle, InodeHandle, PagetableHandle};
use crate::param::{MLFQLEV_NONE, MLFQ_L2, NOFILE, TICKSIZE};
use crate::proc::context::Context;
use crate::proc::table::{Chan, ProcTable, Slot};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcError {
    /// No free slot in the process table.
    MaxProcesses,
    /// A VM/allocation collaborator call failed.
    Allocation,
    /// `wait()` found no children at all.
    NoChildren,
    /// The caller has been `kill`ed.
    Killed,
    /// `copyout` to the caller's address space failed.
    PageError,
    /// `thread_join` was given a `tid` that doesn't name a live thread.
    NoSuchThread,
    /// `thread_join`'s target thread exists but hasn't reached ZOMBIE yet.
    NotYetExited,
    /// The stride class would be over-subscribed.
    OverSubscribed,
}

/// One process-control-block slot. All state-machine fields
/// are only valid to read/write while the table lock is held; `pagetable`,
/// `context`, etc. are private to the process once allocated.
pub struct Process {
    pub state: ProcState,
    pub pid: i32,
    /// Back-reference to the parent's slot; never ownership.
    pub parent: Option<Slot>,
    /// Wait-channel this process is sleeping on, or `None`.
    pub chan: Option<Chan>,
    pub killed: bool,
    pub exit_status: i32,
    pub name: [u8; 16],

    /// Whether a kernel stack has been provisioned for this slot (the
    /// stack's actual memory is kalloc's concern, out of scope here).
    pub has_kstack: bool,
    pub sz: u64,
    /// Pre-thread-creation size, restored when the last thread joins.
    pub old_sz: u64,
    pub pagetable: Option<PagetableHandle>,
    pub context: Context,
    pub open_files: [Option<FileHandle>; NOFILE],
    pub cwd: Option<InodeHandle>,

    // MLFQ
    pub mlfqlev: i8,
    pub allotment: i64,

    // Stride
    pub is_stride: bool,
    pub share: u32,

    // Threads
    pub is_thread: bool,
    pub tgid: u32,
    pub num_thread: u32,
    pub num_sleeping_thread: u32,
    pub prev_thread: Option<Slot>,
    pub retval: i64,
}
impl Process {
    pub const fn new() -> Process {
        Process {
            state: ProcState::Unused,
            pid: 0,
            parent: None,
            chan: None,
            killed: false,
            exit_status: 0,
            name: [0; 16],
            has_kstack: false,
            sz: 0,
            old_sz: 0,
            pagetable: None,
            context: Context::new(),
            open_files: [None; NOFILE],
            cwd: None,
            mlfqlev: MLFQLEV_NONE,
            allotment: 0,
            is_stride: false,
            share: 0,
            is_thread: false,
            tgid: 0,
            num_thread: 0,
            num_sleeping_thread: 0,
            prev_thread: None,
            retval: 0,
        }
    }

    /// Invariant 1: a slot is UNUSED iff it has no kernel stack and pid 0.
    pub fn is_unused(&self) -> bool {
        self.state == ProcState::Unused
    }
}
impl Default for Process {
    fn default() -> Process {
        Process::new()
    }
}

impl ProcTable {
    /// Look in the process table for an UNUSED slot. If found, initialize
    /// state required to run in the kernel and return its index with the
    /// slot already transitioned to EMBRYO. On any allocation failure
    /// after slot reservation, the slot reverts to UNUSED.
    pub fn alloc(&mut self) -> Result<Slot, ProcError> {
        let index = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(ProcError::MaxProcesses)?;

        let pid = self.alloc_pid();
        {
            let p = &mut self.procs[index];
            p.pid = pid;
            p.state = ProcState::Embryo;
        }

        let pagetable = unsafe { collab::proc_pagetable_new() };
        if pagetable == 0 {
            self.procs[index] = Process::new();
            return Err(ProcError::Allocation);
        }

        let p = &mut self.procs[index];
        p.pagetable = Some(pagetable);
        p.has_kstack = true;
        p.context = Context::new();
        p.mlfqlev = MLFQ_L2;
        p.allotment = 20 * TICKSIZE;
        p.is_stride = false;
        p.share = 0;
        p.is_thread = false;
        p.num_thread = 0;
        p.num_sleeping_thread = 0;
        p.tgid = 0;

        Ok(index)
    }

    /// Free a process structure and the data hanging from it, including
    /// user pages. Caller must hold the table lock.
    pub fn free(&mut self, index: Slot) {
        let (pagetable, sz) = {
            let p = &self.procs[index];
            (p.pagetable, p.sz)
        };
        if let Some(pt) = pagetable {
            unsafe { collab::proc_pagetable_free(pt, sz) };
        }
        self.procs[index] = Process::new();
    }

    /// Create a new process copying the parent. Sets up the child to
    /// return 0 from `fork` and RUNNABLE.
    pub fn fork(&mut self, parent: Slot) -> Result<i32, ProcError> {
        let child = self.alloc()?;

        let (parent_pt, parent_sz) = {
            let p = &self.procs[parent];
            (p.pagetable.unwrap(), p.sz)
        };
        let child_pt = unsafe { collab::proc_pagetable_copy(parent_pt, parent_sz) };
        if child_pt == 0 {
            self.free(child);
            return Err(ProcError::Allocation);
        }

        self.procs[child].pagetable = Some(child_pt);
        self.procs[child].sz = parent_sz;
        self.procs[child].name = self.procs[parent].name;

        for fd in 0..NOFILE {
            if let Some(f) = self.procs[parent].open_files[fd] {
                self.procs[child].open_files[fd] = Some(unsafe { collab::filedup(f) });
            }
        }
        if let Some(cwd) = self.procs[parent].cwd {
            self.procs[child].cwd = Some(unsafe { collab::idup(cwd) });
        }

        let pid = self.procs[child].pid;
        self.procs[child].parent = Some(parent);
        // New process is never stride; L2 allotment is
        // already set by `alloc`.
        self.procs[child].state = ProcState::Runnable;

        Ok(pid)
    }

    /// Exit the current process. Closes files, drops the cwd reference,
    /// reparents children to `init`, and transitions to ZOMBIE. The
    /// caller is responsible for then invoking `sched()`;
    /// the returned [`ExitWakeups`] tells it what to wake afterward.
    pub fn begin_exit(&mut self, slot: Slot, init: Slot, status: i32) -> ExitWakeups {
        if slot == init {
            panic!("init exiting");
        }

        for fd in 0..NOFILE {
            if let Some(f) = self.procs[slot].open_files[fd].take() {
                unsafe { collab::fileclose(f) };
            }
        }
        if let Some(cwd) = self.procs[slot].cwd.take() {
            unsafe { collab::iput(cwd) };
        }

        let mut wake_init = false;
        for i in 0..self.procs.len() {
            if self.procs[i].parent == Some(slot) {
                self.procs[i].parent = Some(init);
                if self.procs[i].state == ProcState::Zombie {
                    wake_init = true;
                }
            }
        }

        let parent = self.procs[slot].parent;
        self.procs[slot].exit_status = status;
        self.procs[slot].state = ProcState::Zombie;

        ExitWakeups { parent, wake_init }
    }

    /// Scan for an exited child of `slot`. If found, harvest its exit
    /// status, free it, and return its pid -- recomputing the stride
    /// table if the reaped child was a stride process. Stride reclamation
    /// on `kill` is handled lazily here, when the killed process is
    /// eventually reaped, rather than recomputed immediately on `kill`.
    pub fn reap_zombie_child(&mut self, slot: Slot) -> Result<(Slot, i32, i32), ProcError> {
        let mut has_children = false;
        for i in 0..self.procs.len() {
            // Threads reap through `thread_join`, not `wait`, even though
            // `parent` points at the leader for both.
            if self.procs[i].parent != Some(slot) || self.procs[i].is_thread {
                continue;
            }
            has_children = true;
            if self.procs[i].state == ProcState::Zombie {
                let pid = self.procs[i].pid;
                let status = self.procs[i].exit_status;
                let was_stride = self.procs[i].is_stride;
                self.free(i);
                if was_stride {
                    self.recompute_stride();
                }
                return Ok((i, pid, status));
            }
        }
        if !has_children {
            return Err(ProcError::NoChildren);
        }
        if self.procs[slot].killed {
            return Err(ProcError::Killed);
        }
        Err(ProcError::NoChildren)
    }

    pub fn has_any_child(&self, slot: Slot) -> bool {
        self.procs
            .iter()
            .any(|p| p.parent == Some(slot) && !p.is_thread)
    }

    /// Kill the process with the given pid. Returns `true` if found. A
    /// SLEEPING victim is promoted to RUNNABLE so it observes `killed` on
    /// its next return to user mode.
    pub fn kill(&mut self, pid: i32) -> bool {
        for p in self.procs.iter_mut() {
            if p.pid == pid {
                p.killed = true;
                if p.state == ProcState::Sleeping {
                    p.state = ProcState::Runnable;
                }
                return true;
            }
        }
        false
    }

    /// Grow or shrink `slot`'s user memory by `delta` bytes.
    pub fn growproc(&mut self, slot: Slot, delta: i64) -> Result<(), ProcError> {
        let (pagetable, mut size) = {
            let p = &self.procs[slot];
            (p.pagetable.unwrap(), p.sz)
        };

        if delta > 0 {
            let new_size = size.wrapping_add(delta as u64);
            size = unsafe { collab::uvmalloc(pagetable, size, new_size) };
            if size == 0 {
                return Err(ProcError::Allocation);
            }
        } else if delta < 0 {
            let new_size = size.wrapping_add(delta as u64);
            size = unsafe { collab::uvmdealloc(pagetable, size, new_size) };
        }

        self.procs[slot].sz = size;
        unsafe { collab::switch_pagetable(pagetable) };
        Ok(())
    }

    pub fn getppid(&self, slot: Slot) -> i32 {
        match self.procs[slot].parent {
            Some(parent) => self.procs[parent].pid,
            None => 0,
        }
    }
}

/// Wakeups a caller must perform after `begin_exit` returns, outside the
/// table lock.
pub struct ExitWakeups {
    pub parent: Option<Slot>,
    pub wake_init: bool,
}

#[cfg(test)]
mod tests {
    use crate::proc::process::ProcError;
    use crate::proc::process::ProcState;
    use crate::proc::table::ProcTable;

    #[test]
    fn alloc_assigns_l2_and_full_allotment() {
        let mut t = ProcTable::new();
        let slot = t.alloc().unwrap();
        assert_eq!(t.procs[slot].mlfqlev, crate::param::MLFQ_L2);
        assert_eq!(t.procs[slot].allotment, 20 * crate::param::TICKSIZE);
        assert_eq!(t.procs[slot].state, ProcState::Embryo);
    }

    #[test]
    fn fork_child_is_runnable_and_not_stride() {
        let mut t = ProcTable::new();
        let parent = t.alloc().unwrap();
        t.procs[parent].state = ProcState::Runnable;
        let pid = t.fork(parent).unwrap();
        let child = t.procs.iter().position(|p| p.pid == pid).unwrap();
        assert_eq!(t.procs[child].state, ProcState::Runnable);
        assert!(!t.procs[child].is_stride);
        assert_eq!(t.procs[child].parent, Some(parent));
    }

    #[test]
    fn wait_with_no_children_errors() {
        let mut t = ProcTable::new();
        let slot = t.alloc().unwrap();
        assert_eq!(t.reap_zombie_child(slot), Err(ProcError::NoChildren));
    }

    #[test]
    fn reap_zombie_frees_slot_and_returns_pid() {
        let mut t = ProcTable::new();
        let parent = t.alloc().unwrap();
        let pid = t.fork(parent).unwrap();
        let child = t.procs.iter().position(|p| p.pid == pid).unwrap();
        t.procs[child].state = ProcState::Zombie;
        t.procs[child].exit_status = 7;

        let (freed_slot, reaped_pid, status) = t.reap_zombie_child(parent).unwrap();
        assert_eq!(freed_slot, child);
        assert_eq!(reaped_pid, pid);
        assert_eq!(status, 7);
        assert!(t.procs[child].is_unused());
    }

    #[test]
    fn kill_marks_and_wakes_sleeper() {
        let mut t = ProcTable::new();
        let slot = t.alloc().unwrap();
        t.procs[slot].state = ProcState::Sleeping;
        let pid = t.procs[slot].pid;
        assert!(t.kill(pid));
        assert!(t.procs[slot].killed);
        assert_eq!(t.procs[slot].state, ProcState::Runnable);
        assert!(!t.kill(999_999));
    }

    #[test]
    fn exit_on_init_panics() {
        let mut t = ProcTable::new();
        let init = t.alloc().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.begin_exit(init, init, 0)
        }));
        assert!(result.is_err());
    }

    #[test]
    fn exit_reparents_children_to_init() {
        let mut t = ProcTable::new();
        let init = t.alloc().unwrap();
        let parent = t.alloc().unwrap();
        let child = t.alloc().unwrap();
        t.procs[child].parent = Some(parent);

        t.begin_exit(parent, init, 0);
        assert_eq!(t.procs[child].parent, Some(init));
    }
}
