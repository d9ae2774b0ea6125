use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual behaviors a lantern can run, identified by the byte used on the
/// radio and on the console (`<n> p`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternId {
    Off,
    Twinkle,
    Firefly,
    Fader,
    Pulser,
    ClockSync,
    /// Reserved tag: the payload of a synchronization ping.
    SyncPing,
    LuxMeter,
    /// A number some peer asked for that this node has no name for.
    Other(u8),
}

impl PatternId {
    pub const ALL: [PatternId; 8] = [
        PatternId::Off,
        PatternId::Twinkle,
        PatternId::Firefly,
        PatternId::Fader,
        PatternId::Pulser,
        PatternId::ClockSync,
        PatternId::SyncPing,
        PatternId::LuxMeter,
    ];

    pub const fn as_byte(self) -> u8 {
        match self {
            PatternId::Off => 0,
            PatternId::Twinkle => 1,
            PatternId::Firefly => 2,
            PatternId::Fader => 3,
            PatternId::Pulser => 4,
            PatternId::ClockSync => 10,
            PatternId::SyncPing => 11,
            PatternId::LuxMeter => 90,
            PatternId::Other(byte) => byte,
        }
    }

    /// Named patterns only.
    pub fn from_byte(byte: u8) -> Option<PatternId> {
        Self::ALL.iter().copied().find(|p| p.as_byte() == byte)
    }

    /// Any byte heard on the radio; unnamed ones become `Other`.
    pub fn from_wire(byte: u8) -> PatternId {
        Self::from_byte(byte).unwrap_or(PatternId::Other(byte))
    }

    pub fn name(self) -> &'static str {
        match self {
            PatternId::Off => "off",
            PatternId::Twinkle => "twinkle",
            PatternId::Firefly => "firefly",
            PatternId::Fader => "fader",
            PatternId::Pulser => "pulser",
            PatternId::ClockSync => "clocksync",
            PatternId::SyncPing => "syncping",
            PatternId::LuxMeter => "luxmeter",
            PatternId::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_bytes_map_back() {
        for id in PatternId::ALL {
            assert_eq!(PatternId::from_byte(id.as_byte()), Some(id));
        }
    }

    #[test]
    fn test_unknown_byte_is_rejected() {
        assert_eq!(PatternId::from_byte(5), None);
        assert_eq!(PatternId::from_byte(255), None);
    }

    #[test]
    fn test_wire_bytes_are_total() {
        assert_eq!(PatternId::from_wire(3), PatternId::Fader);
        assert_eq!(PatternId::from_wire(42), PatternId::Other(42));
        assert_eq!(PatternId::from_wire(42).as_byte(), 42);
        assert_eq!(PatternId::from_byte(PatternId::Other(42).as_byte()), None);
    }

    #[test]
    fn test_display_names_and_byte() {
        assert_eq!(PatternId::ClockSync.to_string(), "clocksync(10)");
        assert_eq!(PatternId::Other(42).to_string(), "unknown(42)");
    }
}
