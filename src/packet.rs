//! Radio packets and the wire frame used by the UDP transport.
//!
//! A packet is one header byte plus up to `MAX_PAYLOAD` payload bytes. The
//! header layout follows the RFM12 convention:
//!
//! | bit  | meaning                                           |
//! |------|---------------------------------------------------|
//! | 0x80 | CTL: control packet (ack)                         |
//! | 0x40 | DST: node id field is the destination             |
//! | 0x20 | ACK: sender requests an acknowledgment            |
//! | 0x1F | node id (sender for broadcasts, else destination) |

use anyhow::{anyhow, bail, Result};
use byteorder::{ByteOrder, LittleEndian};
use crate::pattern::PatternId;

pub const HDR_CTL: u8 = 0x80;
pub const HDR_DST: u8 = 0x40;
pub const HDR_ACK: u8 = 0x20;
pub const HDR_MASK: u8 = 0x1F;

/// Largest payload the transceiver accepts.
pub const MAX_PAYLOAD: usize = 66;

/// Payload byte of a synchronization ping.
pub const SYNC_PING: u8 = PatternId::SyncPing.as_byte();

// band, group, header, len
const FRAME_PREFIX: usize = 4;
const FRAME_CRC: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: u8,
    pub payload: Vec<u8>,
}

/// A packet as handed up by the radio, with the CRC verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub packet: Packet,
    pub crc_ok: bool,
}

/// What a valid packet asks of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    SyncPing,
    /// Any other first byte, named or not.
    Pattern(PatternId),
    Empty,
}

impl Packet {
    pub fn new(header: u8, payload: Vec<u8>) -> Self {
        Packet { header, payload }
    }

    pub fn sync_ping(header: u8) -> Self {
        Packet::new(header, vec![SYNC_PING])
    }

    pub fn classify(&self) -> Payload {
        match self.payload.first() {
            Some(&SYNC_PING) => Payload::SyncPing,
            Some(&byte) => Payload::Pattern(PatternId::from_wire(byte)),
            None => Payload::Empty,
        }
    }

    pub fn node_id(&self) -> u8 {
        self.header & HDR_MASK
    }

    pub fn is_addressed(&self) -> bool {
        self.header & HDR_DST != 0
    }
}

impl Received {
    pub fn valid(packet: Packet) -> Self {
        Received { packet, crc_ok: true }
    }

    pub fn corrupted(packet: Packet) -> Self {
        Received { packet, crc_ok: false }
    }

    /// None for CRC failures: those never reach the core.
    pub fn payload(&self) -> Option<Payload> {
        self.crc_ok.then(|| self.packet.classify())
    }
}

/// CRC-16 step, polynomial 0xA001 (avr-libc `_crc16_update`).
pub fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= u16::from(byte);
    for _ in 0..8 {
        if crc & 1 != 0 {
            crc = (crc >> 1) ^ 0xA001;
        } else {
            crc >>= 1;
        }
    }
    crc
}

fn frame_crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, &b| crc16_update(crc, b))
}

/// A decoded frame: the band and group it was sent on plus the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub band: u8,
    pub group: u8,
    pub received: Received,
}

/// Layout: `[band, group, header, len, payload.., crc16 LE]`; the CRC covers
/// group through payload.
pub fn encode_frame(band: u8, group: u8, header: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        bail!("payload of {} bytes exceeds {} byte limit", payload.len(), MAX_PAYLOAD);
    }

    let mut buf = Vec::with_capacity(FRAME_PREFIX + payload.len() + FRAME_CRC);
    buf.push(band);
    buf.push(group);
    buf.push(header);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);

    let crc = frame_crc(&buf[1..]);
    let mut crc_bytes = [0u8; FRAME_CRC];
    LittleEndian::write_u16(&mut crc_bytes, crc);
    buf.extend_from_slice(&crc_bytes);
    Ok(buf)
}

pub fn decode_frame(buf: &[u8]) -> Result<Frame> {
    if buf.len() < FRAME_PREFIX + FRAME_CRC {
        bail!("frame too short ({} bytes)", buf.len());
    }

    let len = buf[3] as usize;
    if len > MAX_PAYLOAD {
        bail!("declared payload length {} exceeds limit", len);
    }

    let end = FRAME_PREFIX + len;
    let crc_field = buf
        .get(end..end + FRAME_CRC)
        .ok_or_else(|| anyhow!("frame truncated: declared {} payload bytes, got {}", len, buf.len()))?;

    let crc_ok = LittleEndian::read_u16(crc_field) == frame_crc(&buf[1..end]);
    let packet = Packet::new(buf[2], buf[FRAME_PREFIX..end].to_vec());

    Ok(Frame {
        band: buf[0],
        group: buf[1],
        received: Received { packet, crc_ok },
    })
}
