use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::traits::ConfigStore;

pub const DEFAULT_FREQUENCY_OFFSET: u16 = 1600;
pub const FREQUENCY_OFFSET_MIN: u16 = 96;
pub const FREQUENCY_OFFSET_MAX: u16 = 3903;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    pub node: NodeConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Band {
    Mhz433,
    Mhz868,
    Mhz915,
}

impl Band {
    /// Console shorthand: 4 = 433, 8 = 868, 9 = 915.
    pub fn from_code(code: u32) -> Option<Band> {
        match code {
            4 => Some(Band::Mhz433),
            8 => Some(Band::Mhz868),
            9 => Some(Band::Mhz915),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Band::Mhz433 => 4,
            Band::Mhz868 => 8,
            Band::Mhz915 => 9,
        }
    }

    pub fn mhz(self) -> u16 {
        match self {
            Band::Mhz433 => 433,
            Band::Mhz868 => 868,
            Band::Mhz915 => 915,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub node_id: u8,             // 5 bits, 1..=30 in normal use
    pub band: Band,
    pub group: u8,               // 0 = listen to every group
    pub frequency_offset: u16,   // 96..=3903 within the band
    pub collect_mode: bool,      // pass addressed packets for other nodes up
    pub quiet_mode: bool,        // don't report bad-CRC packets
    pub hex_output: u8,          // 0: decimal, 1: hex, 2: hex+ascii
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    pub cycle_base_ms: u32,      // nominal half-cycle, about one packet airtime
    pub startup_jitter_ms: u32,  // upper bound of the random entry delay
    pub on_color: [u8; 3],
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            node: NodeConfig {
                node_id: 1,
                band: Band::Mhz868,
                group: 212,
                frequency_offset: DEFAULT_FREQUENCY_OFFSET,
                collect_mode: false,
                quiet_mode: true,
                hex_output: 0,
            },
            sync: SyncConfig {
                cycle_base_ms: 750,
                startup_jitter_ms: 2000,
                on_color: [132, 132, 132],
            },
        }
    }
}

impl NodeConfig {
    /// UDP port standing in for the radio channel: nodes on different
    /// frequency offsets never hear each other.
    pub fn channel_port(&self, port_base: u16) -> u16 {
        port_base.wrapping_add(self.frequency_offset)
    }

    pub fn describe(&self) -> String {
        format!(
            "@ {} i{}{} g{} @ {} MHz +{} q{} x{}",
            (b'@' + (self.node_id & 0x1F)) as char,
            self.node_id,
            if self.collect_mode { "*" } else { "" },
            self.group,
            self.band.mhz(),
            self.frequency_offset,
            u8::from(self.quiet_mode),
            self.hex_output,
        )
    }
}

/// Stores the configuration as pretty-printed JSON on disk.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonConfigStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load at boot. A missing file means a fresh node; a corrupt one is
    /// treated like a bad EEPROM checksum. Both fall back to defaults.
    pub fn load_or_default(&self) -> SystemConfig {
        if !self.path.exists() {
            info!("No config at {}, using defaults", self.path.display());
            return SystemConfig::default();
        }
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Config at {} unusable ({:#}), using defaults", self.path.display(), e);
                SystemConfig::default()
            }
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<SystemConfig> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(config)
    }

    fn save(&mut self, config: &SystemConfig) -> Result<()> {
        let text = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, text).with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}
