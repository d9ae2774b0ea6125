//! The radio channel on a host: one UDP broadcast port per frequency.

use anyhow::{Context, Result};
use log::{debug, info};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::config::NodeConfig;
use crate::packet::{self, Frame, Received, HDR_MASK, MAX_PAYLOAD};
use crate::traits::Radio;

pub const DEFAULT_PORT_BASE: u16 = 40_000;

/// Largest datagram worth reading: prefix, payload and CRC.
const RECV_BUF: usize = MAX_PAYLOAD + 16;

pub fn create_broadcast_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&addr.into()).with_context(|| format!("binding UDP port {}", port))?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Whether a decoded frame is meant for this node.
pub fn accepts(frame: &Frame, config: &NodeConfig) -> bool {
    if frame.band != config.band.code() {
        return false;
    }
    if config.group != 0 && frame.group != config.group {
        return false;
    }

    let pkt = &frame.received.packet;
    let my_id = config.node_id & HDR_MASK;
    if pkt.is_addressed() {
        pkt.node_id() == my_id || config.collect_mode
    } else {
        // Our own broadcast looped back by the host stack.
        pkt.node_id() != my_id
    }
}

pub struct UdpRadio {
    socket: UdpSocket,
    port_base: u16,
    broadcast: Ipv4Addr,
    port: u16,
    config: NodeConfig,
}

impl UdpRadio {
    pub fn open(config: &NodeConfig, port_base: u16, broadcast: Ipv4Addr) -> Result<Self> {
        let port = config.channel_port(port_base);
        let socket = create_broadcast_socket(port)?;
        info!("[RADIO] listening on UDP {} ({} MHz +{}), sending to {}", port, config.band.mhz(), config.frequency_offset, broadcast);

        Ok(UdpRadio {
            socket,
            port_base,
            broadcast,
            port,
            config: config.clone(),
        })
    }

    /// UDP port of the current channel.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.broadcast, self.port)
    }
}

impl Radio for UdpRadio {
    fn can_send(&self) -> bool {
        true
    }

    fn try_send(&mut self, header: u8, payload: &[u8]) -> Result<()> {
        let frame = packet::encode_frame(self.config.band.code(), self.config.group, header, payload)?;
        self.socket.send_to(&frame, self.target()).context("sending frame")?;
        Ok(())
    }

    fn poll_received(&mut self) -> Result<Option<Received>> {
        let mut buf = [0u8; RECV_BUF];
        loop {
            let size = match self.socket.recv_from(&mut buf) {
                Ok((size, _)) => size,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let frame = match packet::decode_frame(&buf[..size]) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("[RADIO] discarding frame: {:#}", e);
                    continue;
                }
            };
            if accepts(&frame, &self.config) {
                return Ok(Some(frame.received));
            }
        }
    }

    /// Re-binds when the channel moved; the old socket stays in use if the
    /// new port can't be bound.
    fn reconfigure(&mut self, config: &NodeConfig) -> Result<()> {
        let port = config.channel_port(self.port_base);
        if port != self.port {
            self.socket = create_broadcast_socket(port)?;
            info!("[RADIO] moved to UDP {} ({} MHz +{})", port, config.band.mhz(), config.frequency_offset);
            self.port = port;
        }
        self.config = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::send_header;
    use crate::config::{Band, SystemConfig};
    use crate::packet::{decode_frame, encode_frame, Packet, SYNC_PING};
    use std::thread;
    use std::time::Duration;

    fn frame(band: u8, group: u8, header: u8) -> Frame {
        decode_frame(&encode_frame(band, group, header, &[1]).unwrap()).unwrap()
    }

    fn config() -> NodeConfig {
        NodeConfig { node_id: 5, band: Band::Mhz868, group: 212, ..SystemConfig::default().node }
    }

    #[test]
    fn test_accepts_peer_broadcast() {
        assert!(accepts(&frame(8, 212, send_header(7, 0)), &config()));
    }

    #[test]
    fn test_rejects_other_band_and_group() {
        assert!(!accepts(&frame(4, 212, send_header(7, 0)), &config()));
        assert!(!accepts(&frame(8, 100, send_header(7, 0)), &config()));
    }

    #[test]
    fn test_group_zero_hears_all_groups() {
        let cfg = NodeConfig { group: 0, ..config() };
        assert!(accepts(&frame(8, 100, send_header(7, 0)), &cfg));
    }

    #[test]
    fn test_rejects_own_loopback() {
        assert!(!accepts(&frame(8, 212, send_header(5, 0)), &config()));
    }

    #[test]
    fn test_addressed_frames() {
        assert!(accepts(&frame(8, 212, send_header(7, 5)), &config()));
        assert!(!accepts(&frame(8, 212, send_header(7, 9)), &config()));
        let collect = NodeConfig { collect_mode: true, ..config() };
        assert!(accepts(&frame(8, 212, send_header(7, 9)), &collect));
    }

    // ------------------------------------------------------------------------
    // Loopback: one radio hears its own datagrams through 127.0.0.1, so the
    // filter is exercised on real frames.
    // ------------------------------------------------------------------------

    fn free_port() -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral port");
        socket.local_addr().expect("local addr").port()
    }

    fn loopback_radio(config: &NodeConfig) -> UdpRadio {
        let port_base = free_port().wrapping_sub(config.frequency_offset);
        UdpRadio::open(config, port_base, Ipv4Addr::LOCALHOST).expect("open radio")
    }

    /// Poll for a while; loopback delivery is fast but not synchronous.
    fn poll_for(radio: &mut UdpRadio) -> Option<Received> {
        for _ in 0..50 {
            if let Some(rx) = radio.poll_received().expect("poll") {
                return Some(rx);
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_loopback_round_trip() {
        let mut radio = loopback_radio(&config());

        radio.try_send(send_header(7, 0), &[3, 4]).unwrap();
        let rx = poll_for(&mut radio).expect("frame from node 7");
        assert_eq!(rx, Received::valid(Packet::new(send_header(7, 0), vec![3, 4])));
    }

    #[test]
    fn test_loopback_own_ping_filtered() {
        let mut radio = loopback_radio(&config());

        radio.try_send(send_header(5, 0), &[SYNC_PING]).unwrap();
        assert_eq!(poll_for(&mut radio), None);
    }

    #[test]
    fn test_reconfigure_moves_loopback_filter() {
        let mut radio = loopback_radio(&config());
        radio.reconfigure(&NodeConfig { node_id: 9, ..config() }).unwrap();

        radio.try_send(send_header(9, 0), &[SYNC_PING]).unwrap();
        assert_eq!(poll_for(&mut radio), None);

        // The old id is now just another peer.
        radio.try_send(send_header(5, 0), &[SYNC_PING]).unwrap();
        assert_eq!(poll_for(&mut radio), Some(Received::valid(Packet::sync_ping(send_header(5, 0)))));
    }

    #[test]
    fn test_reconfigure_rebinds_to_new_channel() {
        let mut radio = loopback_radio(&config());
        let old_port = radio.port();
        let new_offset = free_port().wrapping_sub(radio.port_base);

        radio.reconfigure(&NodeConfig { frequency_offset: new_offset, ..config() }).unwrap();
        assert_ne!(radio.port(), old_port);

        radio.try_send(send_header(7, 0), &[1]).unwrap();
        assert!(poll_for(&mut radio).is_some());
    }

    #[test]
    fn test_reconfigure_same_channel_keeps_socket() {
        let mut radio = loopback_radio(&config());
        let port = radio.port();
        radio.reconfigure(&NodeConfig { group: 7, ..config() }).unwrap();
        assert_eq!(radio.port(), port);

        // Frames now carry and expect the new group.
        radio.try_send(send_header(7, 0), &[1]).unwrap();
        assert!(poll_for(&mut radio).is_some());
    }
}
