//! The 3-level MLFQ that schedules every process not in the stride class:
//! allotment decay within a level, demotion to the next level down on
//! exhausting an allotment, and a periodic boost that resets everyone back
//! to the top level.
//!
//! Grounded on `maxlev()`/`boost()` in the original xv6-public `proc.c`.
//! Levels are checked top-down (`MLFQ_L2` first) exactly as `maxlev()`
//! scans from high to low priority.

use crate::param::{BOOST_INTERVAL, MLFQ_L0, MLFQ_L1, MLFQ_L2, NPROC, TICKSIZE};
use crate::proc::process::{Process, ProcState};
use crate::proc::table::ProcTable;

/// Ticks of CPU time a process gets at each level before being demoted.
/// Level 2 (highest) gets the shortest quantum, level 1 twice that. Level 0
/// is the bottom of the queue: its allotment is conceptually infinite, so it
/// is set to 0 and never consulted by [`charge_tick`].
pub fn allotment_for_level(level: i8) -> i64 {
    match level {
        MLFQ_L2 => 20 * TICKSIZE,
        MLFQ_L1 => 40 * TICKSIZE,
        _ => 0,
    }
}

/// Ticks granted to a single dispatch before the outer loop reconsiders who
/// runs next, distinct from [`allotment_for_level`]'s budget across many
/// dispatches before demotion. Forced down to the L2 duration whenever any
/// stride process exists, so one long MLFQ turn can't eat into the ticks
/// stride accounting expects to hand out.
pub fn local_ticks_for_level(level: i8, stride_active: bool) -> u32 {
    if stride_active {
        return 5;
    }
    match level {
        MLFQ_L2 => 5,
        MLFQ_L1 => 10,
        _ => 20,
    }
}

/// Highest MLFQ level with at least one eligible leader, or `None` if the
/// MLFQ class is empty. A leader with live threads is eligible as long as
/// it or any of its threads is RUNNABLE, even while the leader itself is
/// SLEEPING.
pub fn maxlev(table: &ProcTable) -> Option<i8> {
    for level in [MLFQ_L2, MLFQ_L1, MLFQ_L0] {
        if (0..table.procs.len())
            .any(|i| table.procs[i].mlfqlev == level && table.group_has_runnable_member(i))
        {
            return Some(level);
        }
    }
    None
}

/// Charge one tick of CPU time against `p`'s allotment, demoting it a
/// level once the allotment is exhausted. A process already at the bottom
/// level has no allotment to exhaust and is left alone.
pub fn charge_tick(p: &mut Process) {
    if p.mlfqlev == MLFQ_L0 {
        return;
    }
    p.allotment -= TICKSIZE;
    if p.allotment > 0 {
        return;
    }
    p.mlfqlev = match p.mlfqlev {
        MLFQ_L2 => MLFQ_L1,
        MLFQ_L1 => MLFQ_L0,
        _ => MLFQ_L0,
    };
    p.allotment = allotment_for_level(p.mlfqlev);
}

/// Reset every MLFQ process to the top level with a full allotment. Called
/// by the timer tick handler every [`BOOST_INTERVAL`] ticks.
pub fn boost(table: &mut ProcTable) {
    for p in table.procs.iter_mut() {
        if p.mlfqlev >= MLFQ_L0 {
            p.mlfqlev = MLFQ_L2;
            p.allotment = allotment_for_level(MLFQ_L2);
        }
    }
}

pub fn should_boost(ticks: u64) -> bool {
    ticks > 0 && ticks % BOOST_INTERVAL == 0
}

/// Pick an eligible leader slot at MLFQ level `level`, round-robin from
/// just after `after` (the last dispatched leader at this level), wrapping
/// around the table. Returns the leader slot; which actual group member
/// runs is [`ProcTable::pick_group_member`]'s job.
pub fn pick_at_level(table: &ProcTable, level: i8, after: Option<usize>) -> Option<usize> {
    let start = after.map(|a| (a + 1) % NPROC).unwrap_or(0);
    (0..NPROC)
        .map(|offset| (start + offset) % NPROC)
        .find(|&i| table.procs[i].mlfqlev == level && table.group_has_runnable_member(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::table::ProcTable;

    #[test]
    fn charge_tick_demotes_on_exhaustion() {
        let mut p = Process::new();
        p.mlfqlev = MLFQ_L2;
        p.allotment = TICKSIZE;
        charge_tick(&mut p);
        assert_eq!(p.mlfqlev, MLFQ_L1);
        assert_eq!(p.allotment, allotment_for_level(MLFQ_L1));
    }

    #[test]
    fn charge_tick_leaves_bottom_allotment_unconsulted() {
        let mut p = Process::new();
        p.mlfqlev = MLFQ_L0;
        p.allotment = 0;
        charge_tick(&mut p);
        assert_eq!(p.mlfqlev, MLFQ_L0);
        assert_eq!(p.allotment, 0);
    }

    #[test]
    fn boost_resets_every_mlfq_process() {
        let mut t = ProcTable::new();
        let slot = t.alloc().unwrap();
        t.procs[slot].mlfqlev = MLFQ_L0;
        t.procs[slot].allotment = 1;
        boost(&mut t);
        assert_eq!(t.procs[slot].mlfqlev, MLFQ_L2);
        assert_eq!(t.procs[slot].allotment, allotment_for_level(MLFQ_L2));
    }

    #[test]
    fn maxlev_picks_highest_nonempty_level() {
        let mut t = ProcTable::new();
        let a = t.alloc().unwrap();
        let b = t.alloc().unwrap();
        t.procs[a].mlfqlev = MLFQ_L0;
        t.procs[a].state = ProcState::Runnable;
        t.procs[b].mlfqlev = MLFQ_L2;
        t.procs[b].state = ProcState::Runnable;
        assert_eq!(maxlev(&t), Some(MLFQ_L2));
    }

    #[test]
    fn should_boost_fires_on_interval() {
        assert!(!should_boost(0));
        assert!(should_boost(BOOST_INTERVAL));
        assert!(!should_boost(BOOST_INTERVAL + 1));
    }

    #[test]
    fn local_ticks_shrink_to_five_once_stride_exists() {
        assert_eq!(local_ticks_for_level(MLFQ_L0, false), 20);
        assert_eq!(local_ticks_for_level(MLFQ_L1, false), 10);
        assert_eq!(local_ticks_for_level(MLFQ_L2, false), 5);
        assert_eq!(local_ticks_for_level(MLFQ_L0, true), 5);
    }
}
