use serde::{Deserialize, Serialize};
use crate::pattern::PatternId;
use crate::phase::PhaseAdjustment;

/// Node status reported on the console (`v`) and in the periodic log line.
///
/// The sync fields describe the most recent completed ON+OFF cycle and are
/// reset whenever the ClockSync body is (re)entered.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeStatus {
    /// Pattern body currently dispatched
    pub running: PatternId,

    /// Window corrections in force
    pub adjustment: PhaseAdjustment,

    /// Completed ON+OFF cycles since ClockSync was entered
    pub cycles: u32,

    /// Peer pings heard in the last ON / OFF window
    pub last_on_pings: u32,
    pub last_off_pings: u32,

    /// Own pings transmitted / skipped because the channel was busy
    pub pings_sent: u32,
    pub pings_skipped: u32,

    /// Packets discarded (bad CRC, empty or unknown payload)
    pub packets_dropped: u32,

    /// Clock reading at the last update
    pub updated_ms: u32,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus {
            running: PatternId::Off,
            adjustment: PhaseAdjustment::default(),
            cycles: 0,
            last_on_pings: 0,
            last_off_pings: 0,
            pings_sent: 0,
            pings_skipped: 0,
            packets_dropped: 0,
            updated_ms: 0,
        }
    }
}

impl NodeStatus {
    /// Forget the sync statistics; called when the ClockSync body starts.
    pub fn reset_sync(&mut self, cycle_base: u32) {
        self.adjustment = PhaseAdjustment::new(cycle_base);
        self.cycles = 0;
        self.last_on_pings = 0;
        self.last_off_pings = 0;
    }
}
