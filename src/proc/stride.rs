//! Stride scheduling: admission control and pass/stride bookkeeping for the
//! subset of processes that opted out of MLFQ for a guaranteed CPU share.
//!
//! Grounded on `set_stride()` in the original xv6-public `proc.c`: shares
//! are percentages, strides are derived from a shared LCM so that every
//! member (including the implicit MLFQ class) advances its pass by an
//! integer amount each dispatch, and the process with the smallest pass
//! runs next.

use crate::param::{MIN_MLFQ_SHARE, NPROC, STRIDE_ADMIT_CEILING};
use crate::proc::table::Slot;

pub const LARGE_STRIDE: u64 = 1 << 20;

#[derive(Copy, Clone, Debug, Default)]
pub struct StrideEntry {
    pub slot: Slot,
    pub share: u32,
    pub stride: u64,
    pub pass: u64,
}

/// The stride class plus the implicit MLFQ entry that always holds
/// whatever share stride admission has left unclaimed.
pub struct StrideSet {
    pub members: arrayvec::ArrayVec<StrideEntry, NPROC>,
    pub total_share: u32,
    pub mlfq_pass: u64,
    mlfq_stride: u64,
}
impl StrideSet {
    pub const fn new() -> StrideSet {
        StrideSet {
            members: arrayvec::ArrayVec::new_const(),
            total_share: 0,
            mlfq_pass: 0,
            mlfq_stride: LARGE_STRIDE / (100 - STRIDE_ADMIT_CEILING) as u64,
        }
    }

    /// Can `share` percent be admitted on top of the current stride
    /// membership without starving MLFQ below [`MIN_MLFQ_SHARE`]?
    pub fn can_admit(&self, share: u32) -> bool {
        if share == 0 {
            return false;
        }
        let new_total = self.total_share + share;
        new_total <= STRIDE_ADMIT_CEILING && 100 - new_total >= MIN_MLFQ_SHARE
    }

    /// Recompute every member's stride from scratch after the membership
    /// set changed, following the LCM construction in the original:
    /// stride_i = LCM / share_i, where LCM is large enough that every share
    /// (plus the MLFQ remainder) divides it evenly. Every pass, including
    /// the implicit MLFQ entry's, resets to 0 so a newly admitted member
    /// starts on equal footing with everyone already running.
    pub fn rebuild(&mut self, current: &[(Slot, u32)]) {
        self.members.clear();
        self.total_share = current.iter().map(|(_, s)| s).sum();
        let mlfq_share = (100 - self.total_share).max(1);

        let lcm = lcm_of_shares(current.iter().map(|(_, s)| *s), mlfq_share);

        for &(slot, share) in current {
            let stride = lcm / share as u64;
            self.members.push(StrideEntry {
                slot,
                share,
                stride,
                pass: 0,
            });
        }
        self.mlfq_stride = lcm / mlfq_share as u64;
        self.mlfq_pass = 0;
    }

    pub fn admit(&mut self, slot: Slot, share: u32) {
        let mut current: arrayvec::ArrayVec<(Slot, u32), NPROC> =
            self.members.iter().map(|m| (m.slot, m.share)).collect();
        current.push((slot, share));
        self.rebuild(&current);
    }

    /// Pick whichever of the stride members or the implicit MLFQ class has
    /// the smallest pass, returning `None` (dispatch to MLFQ) when the
    /// stride set is empty or MLFQ's pass is smallest. Ties favor the
    /// highest index: the implicit MLFQ entry (conceptually the last index)
    /// beats any stride member, and among members the last-admitted one
    /// wins, mirroring the original's forward `<=` scan.
    pub fn pick(&self) -> Option<Slot> {
        let mut best: Option<&StrideEntry> = None;
        for m in self.members.iter() {
            let replace = match best {
                Some(b) => m.pass <= b.pass,
                None => true,
            };
            if replace {
                best = Some(m);
            }
        }
        match best {
            Some(m) if m.pass < self.mlfq_pass => Some(m.slot),
            _ => None,
        }
    }

    pub fn advance(&mut self, slot: Slot) {
        if let Some(m) = self.members.iter_mut().find(|m| m.slot == slot) {
            m.pass += m.stride;
        }
        self.normalize_if_caught_up();
    }

    pub fn advance_mlfq(&mut self) {
        self.mlfq_pass += self.mlfq_stride;
        self.normalize_if_caught_up();
    }

    /// Reset every pass to 0 once the first-registered member's pass has
    /// been matched (or passed) by every other member and by MLFQ, so
    /// `pass` doesn't grow without bound over a long uptime.
    fn normalize_if_caught_up(&mut self) {
        let Some(baseline) = self.members.first().map(|m| m.pass) else {
            return;
        };
        if baseline == 0 {
            return;
        }
        let caught_up = self.mlfq_pass == baseline && self.members.iter().all(|m| m.pass == baseline);
        if caught_up {
            for m in self.members.iter_mut() {
                m.pass = 0;
            }
            self.mlfq_pass = 0;
        }
    }

    pub fn remove(&mut self, slot: Slot) {
        let remaining: arrayvec::ArrayVec<(Slot, u32), NPROC> = self
            .members
            .iter()
            .filter(|m| m.slot != slot)
            .map(|m| (m.slot, m.share))
            .collect();
        self.rebuild(&remaining);
    }
}
impl Default for StrideSet {
    fn default() -> StrideSet {
        StrideSet::new()
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        panic!("gcd: zero can't be GCDed");
    }
    gcd_euclid(a, b)
}

fn gcd_euclid(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd_euclid(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

fn lcm_of_shares(shares: impl Iterator<Item = u32>, mlfq_share: u32) -> u64 {
    let mut acc = mlfq_share as u64;
    for s in shares {
        acc = lcm(acc, s as u64);
    }
    acc * 100
}
