mod common;

use common::{no_jitter, Rig};
use fireflysync::command::send_header;
use fireflysync::config::SystemConfig;
use fireflysync::packet::{Packet, Received, SYNC_PING};
use fireflysync::pattern::PatternId;
use fireflysync::phase::PhaseAdjustment;
use fireflysync::sim::SentPacket;

const ON_COLOR: (u8, u8, u8) = (132, 132, 132);
const TWINKLE_ON: (u8, u8, u8) = (232, 232, 232);

fn peer_packet(payload: u8) -> Packet {
    Packet::new(send_header(2, 0), vec![payload])
}

#[test]
fn test_pattern_packet_during_on_phase_leaves_sync() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(300, peer_packet(PatternId::Twinkle.as_byte()));
    let mut node = rig.node(no_jitter(), 400);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::Twinkle);
    assert_eq!(node.status.running, PatternId::Twinkle);
    assert_eq!(rig.first_time_of(ON_COLOR), Some(0));
    assert_eq!(rig.first_time_of(TWINKLE_ON), Some(300));
    assert_eq!(rig.radio.sent(), vec![SentPacket { at: 0, header: send_header(1, 0), payload: vec![SYNC_PING] }]);
}

#[test]
fn test_pattern_packet_during_off_phase_leaves_sync() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(1_000, peer_packet(PatternId::Twinkle.as_byte()));
    let mut node = rig.node(no_jitter(), 1_100);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::Twinkle);
    assert_eq!(rig.first_time_of((0, 0, 0)), Some(0));
    assert!(rig.times_of((0, 0, 0)).contains(&750));
    assert_eq!(rig.first_time_of(TWINKLE_ON), Some(1_000));
}

#[test]
fn test_corrupted_packets_are_ignored() {
    let rig = Rig::new();
    rig.radio.deliver_at(300, Received::corrupted(peer_packet(PatternId::Twinkle.as_byte())));
    rig.radio.deliver_at(1_000, Received::corrupted(peer_packet(SYNC_PING)));
    let mut node = rig.node(no_jitter(), 3_100);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::ClockSync);
    assert_eq!(node.status.packets_dropped, 2);
    assert_eq!(node.status.cycles, 2);
    assert_eq!(node.status.last_off_pings, 0);
    assert_eq!(node.status.adjustment, PhaseAdjustment::new(750));
}

#[test]
fn test_unknown_pattern_byte_during_on_phase_leaves_sync() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(300, peer_packet(42));
    let mut node = rig.node(no_jitter(), 400);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::Other(42));
    assert_eq!(node.status.running, PatternId::Other(42));
    assert_eq!(node.status.packets_dropped, 0);
    // No body for 42: the node goes dark.
    assert_eq!(rig.times_of((0, 0, 0)), vec![0, 300]);
}

#[test]
fn test_unknown_pattern_byte_during_off_phase_leaves_sync() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(1_000, peer_packet(42));
    let mut node = rig.node(no_jitter(), 1_100);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::Other(42));
    assert_eq!(rig.times_of((0, 0, 0)), vec![0, 750, 1_000]);
}

#[test]
fn test_empty_payload_restarts_sync() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(200, Packet::new(send_header(2, 0), vec![]));
    let mut node = rig.node(no_jitter(), 300);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::ClockSync);
    assert_eq!(rig.times_of(ON_COLOR), vec![0, 200]);
    assert_eq!(rig.radio.sent().len(), 2);
}

#[test]
fn test_alone_keeps_base_cycle() {
    let rig = Rig::new();
    let mut node = rig.node(no_jitter(), 15_100);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    let expected: Vec<u32> = (0..=10).map(|i| i * 1_500).collect();
    assert_eq!(rig.times_of(ON_COLOR), expected);
    assert_eq!(node.status.cycles, 10);
    assert_eq!(node.status.pings_sent, 11);
    assert_eq!(node.status.adjustment, PhaseAdjustment::new(750));
}

#[test]
fn test_busy_channel_skips_pings() {
    let rig = Rig::new();
    rig.radio.set_busy(true);
    let mut node = rig.node(no_jitter(), 3_100);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.status.pings_sent, 0);
    assert_eq!(node.status.pings_skipped, 3);
    assert_eq!(node.status.cycles, 2);
    assert!(rig.radio.sent().is_empty());
}

#[test]
fn test_peer_ping_in_on_window_stretches_off() {
    let rig = Rig::new();
    rig.radio.deliver_packet_at(300, Packet::sync_ping(send_header(2, 0)));
    let mut node = rig.node(no_jitter(), 3_200);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.status.last_on_pings, 0);
    assert_eq!(node.status.cycles, 2);
    // Cycle 1 heard the ping and set off_extra = 300 / 1 / 2; cycle 2 was
    // silent and reset it.
    assert_eq!(rig.times_of(ON_COLOR), vec![0, 1_500, 3_150]);
    assert_eq!(rig.times_of((0, 0, 0)), vec![0, 750, 2_250]);
    assert_eq!(node.status.adjustment, PhaseAdjustment::new(750));
}

#[test]
fn test_startup_jitter_delays_first_ping() {
    let rig = Rig::new();
    let mut node = rig.node(SystemConfig::default(), 4_000);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    let sent = rig.radio.sent();
    let first = sent.first().expect("no ping sent");
    assert!(first.at <= 2_000);
    assert_eq!(first.payload, vec![SYNC_PING]);
    assert_eq!(rig.first_time_of(ON_COLOR), Some(first.at));
}

#[test]
fn test_console_command_preempts_sync() {
    let rig = Rig::new();
    rig.console.type_at(2_000, "3p");
    let mut node = rig.node(no_jitter(), 2_300);
    node.request_pattern(PatternId::ClockSync);

    node.run();

    assert_eq!(node.running_pattern(), PatternId::Fader);
    let sent = rig.radio.sent();
    let last = sent.last().expect("nothing sent");
    assert_eq!(last.payload, vec![PatternId::Fader.as_byte()]);
    assert!((2_000..=2_001).contains(&last.at));
}
