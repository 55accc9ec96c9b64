//! The process scheduler and thread subsystem: the process table, the
//! MLFQ and stride schedulers that share it, and the syscalls layered
//! directly on process state.

pub mod context;
pub mod mlfq;
pub mod process;
pub mod scheduler;
pub mod stride;
pub mod table;
pub mod thread;

pub use process::{ExitWakeups, Process, ProcError, ProcState};
pub use table::{Chan, ProcTable, Slot, CPUS, TABLE};
