/// Maximum number of processes.
pub const NPROC: usize = 64;
/// Maximum number of CPUs.
pub const NCPU: usize = 8;
/// Maximum number of open files per process.
pub const NOFILE: usize = 16;

/// Cycles per tick, an implementation-defined scaling factor orthogonal
/// from the tick-based boost period.
pub const TICKSIZE: i64 = 1_000_000;
/// How many timer ticks between priority boosts.
pub const BOOST_INTERVAL: u64 = 100;

/// MLFQ levels, highest first.
pub const MLFQ_L2: i8 = 2;
pub const MLFQ_L1: i8 = 1;
pub const MLFQ_L0: i8 = 0;
/// `mlfqlev` of any process not independently chosen by the MLFQ scan:
/// either governed by the stride scheduler, or a thread dispatched only
/// through its leader's round-robin sub-loop.
pub const MLFQLEV_STRIDE: i8 = -1;
/// `mlfqlev` of a slot that holds no process.
pub const MLFQLEV_NONE: i8 = -2;

/// The stride class as a whole may never be admitted past this total
/// share, guaranteeing the MLFQ class at least `100 - STRIDE_ADMIT_CEILING`
/// percent.
pub const STRIDE_ADMIT_CEILING: u32 = 80;
/// The share reserved for MLFQ no matter how stride admission is tuned --
/// every admitted stride share and the MLFQ remainder must stay >= 1.
pub const MIN_MLFQ_SHARE: u32 = 100 - STRIDE_ADMIT_CEILING;
