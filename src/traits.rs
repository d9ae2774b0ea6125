use anyhow::Result;
use crate::config::{NodeConfig, SystemConfig};
use crate::packet::Received;

#[cfg_attr(test, mockall::automock)]
pub trait Radio {
    /// True when the channel is idle and a transmission may start.
    fn can_send(&self) -> bool;

    /// Start a transmission. Best effort: no retry, no acknowledgment.
    fn try_send(&mut self, header: u8, payload: &[u8]) -> Result<()>;

    /// Returns Ok(Some(received)) if a packet is waiting, Ok(None) otherwise.
    /// Never blocks.
    fn poll_received(&mut self) -> Result<Option<Received>>;

    /// Apply a changed node configuration: identity, group, band and
    /// channel. Called after every console change.
    fn reconfigure(&mut self, config: &NodeConfig) -> Result<()>;
}

pub type Rgb = (u8, u8, u8);

/// RGB actuator in logical brightness (0 = dark, 255 = full on).
#[cfg_attr(test, mockall::automock)]
pub trait Led {
    fn set_color(&mut self, r: u8, g: u8, b: u8);
}

/// Operator serial line.
#[cfg_attr(test, mockall::automock)]
pub trait Console {
    /// Next pending input byte, if any. Never blocks.
    fn read_byte(&mut self) -> Option<u8>;
    fn write_str(&mut self, s: &str);
}

/// Persistent node configuration (the EEPROM of the lantern).
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore {
    fn load(&self) -> Result<SystemConfig>;
    fn save(&mut self, config: &SystemConfig) -> Result<()>;
}
