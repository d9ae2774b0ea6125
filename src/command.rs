//! Operator command line.
//!
//! Input is processed one byte at a time, RF12demo style: digits build a
//! value, `,` pushes it onto a byte stack, and a command character acts on
//! the stack and value and then clears both. `12,34,5 s` sends bytes 12 and
//! 34 to node 5.

use crate::config::NodeConfig;
use crate::packet::{Received, HDR_DST, HDR_MASK, MAX_PAYLOAD};

pub const HELP_TEXT: &str = "\n\
Available commands:\n\
  <nn> i     - set node ID (standard node ids are 1..30)\n\
  <n> b      - set MHz band (4 = 433, 8 = 868, 9 = 915)\n\
  <nnnn> o   - change frequency offset within the band (default 1600)\n\
               96..3903 is the supported range\n\
  <nnn> g    - set network group (0 = any)\n\
  <n> c      - set collect mode (advanced, normally 0)\n\
  <n> q      - set quiet mode (1 = don't report bad packets)\n\
  <n> x      - set reporting format (0: decimal, 1: hex, 2: hex+ascii)\n\
  <n> p      - run pattern n here and broadcast it to the network\n\
               (0 off, 1 twinkle, 2 firefly, 3 fader, 4 pulser, 10 clocksync)\n\
  t          - broadcast max-size test packet\n\
  ...,<nn> s - send data packet to node <nn> (0 = broadcast)\n\
  v          - show version, configuration and status\n";

pub fn version_line() -> String {
    format!("[fireflysync {}]", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetNodeId(u8),
    SetBand(u32),
    SetFrequencyOffset(u32),
    SetGroup(u8),
    SetCollectMode(bool),
    SetQuietMode(bool),
    SetHexOutput(u8),
    SelectPattern(u32),
    TestPacket,
    Send { dest: u8, data: Vec<u8> },
    Version,
    Help,
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parsed {
    /// Echo line for lowercase command letters, e.g. `> 12,34,5s`.
    pub echo: Option<String>,
    pub command: Option<Command>,
}

#[derive(Debug, Default)]
pub struct CommandParser {
    value: u32,
    stack: Vec<u8>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, c: u8) -> Parsed {
        match c {
            b'0'..=b'9' => {
                self.value = self.value.saturating_mul(10).saturating_add(u32::from(c - b'0'));
                return Parsed::default();
            }
            b',' => {
                if self.stack.len() < MAX_PAYLOAD {
                    self.stack.push(self.value as u8); // truncated to 8 bits
                }
                self.value = 0;
                return Parsed::default();
            }
            b' ' | b'\t' => return Parsed::default(),
            _ => {}
        }

        let mut parsed = Parsed::default();
        if c.is_ascii_lowercase() {
            let mut echo = String::from("> ");
            for byte in &self.stack {
                echo.push_str(&byte.to_string());
                echo.push(',');
            }
            echo.push_str(&self.value.to_string());
            echo.push(c as char);
            parsed.echo = Some(echo);
        }
        if c > b' ' && c < 0x7F {
            parsed.command = Some(self.decode(c));
        }

        self.value = 0;
        self.stack.clear();
        parsed
    }

    fn decode(&self, c: u8) -> Command {
        let value = self.value;
        match c {
            b'i' => Command::SetNodeId((value & u32::from(HDR_MASK)) as u8),
            b'b' => Command::SetBand(value),
            b'o' => Command::SetFrequencyOffset(value),
            b'g' => Command::SetGroup(value as u8),
            b'c' => Command::SetCollectMode(value != 0),
            b'q' => Command::SetQuietMode(value != 0),
            b'x' => Command::SetHexOutput(value.min(2) as u8),
            b'p' => Command::SelectPattern(value),
            b't' => Command::TestPacket,
            b's' => Command::Send { dest: value as u8, data: self.stack.clone() },
            b'v' => Command::Version,
            _ => Command::Help,
        }
    }
}

/// Header for a packet from `node_id` to `dest` (0 = broadcast).
pub fn send_header(node_id: u8, dest: u8) -> u8 {
    if dest == 0 {
        node_id & HDR_MASK
    } else {
        HDR_DST | (dest & HDR_MASK)
    }
}

fn push_byte(out: &mut String, value: u8, hex: bool) {
    if hex {
        out.push_str(&format!("{:02X}", value));
    } else {
        out.push_str(&value.to_string());
    }
}

/// Console report of a received packet. Returns None for a bad-CRC packet in
/// quiet mode. Bad packets show at most 20 payload bytes.
pub fn format_report(received: &Received, config: &NodeConfig) -> Option<String> {
    let hex = config.hex_output > 0;
    let packet = &received.packet;
    let mut shown = packet.payload.len();

    let mut out = String::new();
    if received.crc_ok {
        out.push_str("OK");
    } else {
        if config.quiet_mode {
            return None;
        }
        out.push_str(" ?");
        shown = shown.min(20);
    }
    if hex {
        out.push('X');
    }
    out.push(' ');
    push_byte(&mut out, packet.header, hex);
    for &byte in &packet.payload[..shown] {
        if !hex {
            out.push(' ');
        }
        push_byte(&mut out, byte, hex);
    }

    if config.hex_output > 1 {
        out.push_str("\nASC ");
        out.push(if packet.is_addressed() { '>' } else { '<' });
        out.push((b'@' + packet.node_id()) as char);
        for &byte in &packet.payload[..shown] {
            out.push(' ');
            out.push(if (b' '..=b'~').contains(&byte) { byte as char } else { '.' });
        }
    }
    Some(out)
}
