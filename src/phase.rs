use log::debug;
use serde::{Deserialize, Serialize};
use crate::clock::elapsed_since;

/// Tally of the pings heard during one half-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start_time: u32,
    pub end_time: u32,
    pub ping_count: u32,
    pub elapsed_sum: u32,
}

impl SyncWindow {
    pub fn open(start_time: u32, length: u32) -> Self {
        SyncWindow {
            start_time,
            end_time: start_time.wrapping_add(length),
            ping_count: 0,
            elapsed_sum: 0,
        }
    }

    pub fn length(&self) -> u32 {
        self.end_time.wrapping_sub(self.start_time)
    }

    pub fn elapsed(&self, now: u32) -> u32 {
        elapsed_since(now, self.start_time)
    }

    pub fn remaining(&self, now: u32) -> u32 {
        self.length().saturating_sub(self.elapsed(now))
    }

    pub fn is_open(&self, now: u32) -> bool {
        self.elapsed(now) < self.length()
    }

    /// A peer pinged while my LED was on: they lead me by `elapsed`.
    pub fn record_on(&mut self, now: u32) {
        self.ping_count += 1;
        self.elapsed_sum = self.elapsed_sum.saturating_add(self.elapsed(now));
    }

    /// A peer pinged while my LED was off: they are `remaining` ahead of my
    /// next ON.
    pub fn record_off(&mut self, now: u32) {
        self.ping_count += 1;
        self.elapsed_sum = self.elapsed_sum.saturating_add(self.remaining(now));
    }
}

/// Per-node correction of the ON and OFF window lengths. Lives for as long as
/// the ClockSync body runs; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseAdjustment {
    pub cycle_base: u32,
    pub on_extra: u32,
    pub off_extra: u32,
}

fn half_average(sum: u32, count: u32) -> u32 {
    sum.checked_div(count).unwrap_or(0) >> 1
}

impl PhaseAdjustment {
    pub fn new(cycle_base: u32) -> Self {
        PhaseAdjustment { cycle_base, on_extra: 0, off_extra: 0 }
    }

    pub fn on_length(&self) -> u32 {
        self.cycle_base.saturating_add(self.on_extra)
    }

    pub fn off_length(&self) -> u32 {
        self.cycle_base.saturating_add(self.off_extra)
    }

    /// Fold one completed ON+OFF cycle into the window lengths. At most one
    /// extra is non-zero afterwards.
    pub fn update(&mut self, on: &SyncWindow, off: &SyncWindow) {
        let (on_count, off_count) = (on.ping_count, off.ping_count);
        let (sum_on, sum_off) = (on.elapsed_sum, off.elapsed_sum);

        if on_count > off_count {
            // Mostly in step: stretch OFF by half the mean lead.
            self.on_extra = 0;
            self.off_extra = half_average(sum_on, on_count);
        } else if on_count < off_count {
            // Mostly out of step. Uses the ON tally, not the OFF one; with no
            // ON pings the quotient is zero.
            self.off_extra = 0;
            self.on_extra = half_average(sum_on, on_count);
        } else if on_count == 0 {
            self.on_extra = 0;
            self.off_extra = 0;
        } else if sum_on < sum_off {
            self.on_extra = 0;
            self.off_extra = half_average(sum_on, on_count);
        } else {
            self.off_extra = 0;
            self.on_extra = half_average(sum_off, off_count);
        }

        debug!(
            "[SYNC] on {}/{}ms off {}/{}ms -> on_extra={}ms off_extra={}ms",
            on_count, sum_on, off_count, sum_off, self.on_extra, self.off_extra
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(count: u32, sum: u32) -> SyncWindow {
        SyncWindow { start_time: 0, end_time: 750, ping_count: count, elapsed_sum: sum }
    }

    #[test]
    fn test_window_on_records_elapsed() {
        let mut w = SyncWindow::open(1_000, 750);
        w.record_on(1_300);
        w.record_on(1_100);
        assert_eq!(w.ping_count, 2);
        assert_eq!(w.elapsed_sum, 400);
    }

    #[test]
    fn test_window_off_records_remaining() {
        let mut w = SyncWindow::open(1_000, 750);
        w.record_off(1_600);
        assert_eq!(w.elapsed_sum, 150);
        // Late processing past the end contributes nothing.
        w.record_off(1_800);
        assert_eq!(w.elapsed_sum, 150);
        assert_eq!(w.ping_count, 2);
    }

    #[test]
    fn test_window_open_across_wrap() {
        let start = u32::MAX - 100;
        let w = SyncWindow::open(start, 750);
        assert!(w.is_open(start));
        assert!(w.is_open(500));
        assert!(!w.is_open(649));
        assert_eq!(w.remaining(500), 149);
    }

    #[test]
    fn test_more_on_pings_stretch_off() {
        let mut adj = PhaseAdjustment::new(750);
        adj.on_extra = 40;
        adj.update(&tally(2, 600), &tally(1, 100));
        assert_eq!(adj.on_extra, 0);
        assert_eq!(adj.off_extra, 150);
        assert_eq!(adj.off_length(), 900);
    }

    #[test]
    fn test_suspect_asymmetry_on_branch_uses_on_tally() {
        // Suspect asymmetry: when OFF pings dominate, the ON stretch is taken
        // from the ON tally (sum_on / on_count), not from the OFF tally that
        // outnumbered it. The symmetric sum_off / off_count alternative would
        // give 900 / 3 / 2 = 150 here.
        let on = tally(1, 200);
        let off = tally(3, 900);
        let mut adj = PhaseAdjustment::new(750);
        adj.off_extra = 30;
        adj.update(&on, &off);

        assert_eq!(adj.off_extra, 0);
        assert_eq!(adj.on_extra, 100);
        let symmetric = off.elapsed_sum / off.ping_count / 2;
        assert_eq!(symmetric, 150);
        assert_ne!(adj.on_extra, symmetric);
    }

    #[test]
    fn test_only_off_pings_leave_both_extras_zero() {
        let mut adj = PhaseAdjustment::new(750);
        adj.update(&tally(0, 0), &tally(2, 500));
        assert_eq!((adj.on_extra, adj.off_extra), (0, 0));
    }

    #[test]
    fn test_no_pings_reset() {
        let mut adj = PhaseAdjustment::new(750);
        adj.on_extra = 12;
        adj.update(&tally(0, 0), &tally(0, 0));
        assert_eq!((adj.on_extra, adj.off_extra), (0, 0));
    }

    #[test]
    fn test_tie_smaller_on_sum_stretches_off() {
        let mut adj = PhaseAdjustment::new(750);
        adj.update(&tally(2, 100), &tally(2, 400));
        assert_eq!(adj.on_extra, 0);
        assert_eq!(adj.off_extra, 25);
    }

    #[test]
    fn test_tie_smaller_off_sum_stretches_on() {
        let mut adj = PhaseAdjustment::new(750);
        adj.update(&tally(1, 500), &tally(1, 80));
        assert_eq!(adj.off_extra, 0);
        assert_eq!(adj.on_extra, 40);
    }

    #[test]
    fn test_at_most_one_extra_nonzero() {
        let mut adj = PhaseAdjustment::new(750);
        let cases = [(3, 900, 1, 10), (1, 10, 3, 900), (2, 50, 2, 60), (2, 60, 2, 50), (0, 0, 0, 0)];
        for (oc, so, fc, sf) in cases {
            adj.update(&tally(oc, so), &tally(fc, sf));
            assert!(adj.on_extra == 0 || adj.off_extra == 0, "both extras set for {:?}", (oc, so, fc, sf));
        }
    }
}
