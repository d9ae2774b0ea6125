//! Firefly phase synchronization.
//!
//! Each node alternates an ON and an OFF window, broadcasting one ping at the
//! start of every ON window. Pings heard while ON mean a peer leads slightly;
//! pings heard while OFF mean a peer is ahead of my next ON. Once per full
//! cycle the tallies stretch one of my windows by half the mean observed
//! offset (see `PhaseAdjustment::update`), which walks the population toward a
//! common phase without leaders, peer identities or acknowledgments.
//!
//! `SyncEngine` is the pure half-cycle state machine; `run_clock_sync` is the
//! pattern body that wires it to the LED, radio and clock.

use log::{debug, info, warn};

use crate::clock::MonotonicClock;
use crate::node::Node;
use crate::packet::{Payload, SYNC_PING};
use crate::patterns::LED_OFF;
use crate::phase::{PhaseAdjustment, SyncWindow};
use crate::scheduler::BodyResult;
use crate::traits::{Led, Radio};

/// Sleep between radio polls when nothing is waiting.
const POLL_IDLE_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfCycle {
    On,
    Off,
}

/// Tallies of the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub on: SyncWindow,
    pub off: SyncWindow,
    pub adjustment: PhaseAdjustment,
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    adjustment: PhaseAdjustment,
    half: Option<HalfCycle>,
    window: SyncWindow,
    on_window: SyncWindow,
    cycles: u32,
    last_on_start: Option<u32>,
    last_report: Option<CycleReport>,
}

impl SyncEngine {
    pub fn new(cycle_base: u32) -> Self {
        SyncEngine {
            adjustment: PhaseAdjustment::new(cycle_base),
            half: None,
            window: SyncWindow::open(0, 0),
            on_window: SyncWindow::open(0, 0),
            cycles: 0,
            last_on_start: None,
            last_report: None,
        }
    }

    /// Open the first ON window at `now`.
    pub fn begin(&mut self, now: u32) -> HalfCycle {
        self.open_on(now);
        HalfCycle::On
    }

    fn open_on(&mut self, now: u32) {
        self.half = Some(HalfCycle::On);
        self.window = SyncWindow::open(now, self.adjustment.on_length());
        self.last_on_start = Some(now);
    }

    /// Close the current window if it has run out. Returns the half-cycle that
    /// was just opened; finishing an OFF window also applies the adjustment.
    pub fn advance(&mut self, now: u32) -> Option<HalfCycle> {
        let half = self.half?;
        if self.window.is_open(now) {
            return None;
        }

        match half {
            HalfCycle::On => {
                self.on_window = self.window;
                self.half = Some(HalfCycle::Off);
                self.window = SyncWindow::open(now, self.adjustment.off_length());
                Some(HalfCycle::Off)
            }
            HalfCycle::Off => {
                self.adjustment.update(&self.on_window, &self.window);
                self.cycles += 1;
                self.last_report = Some(CycleReport {
                    on: self.on_window,
                    off: self.window,
                    adjustment: self.adjustment,
                });
                self.open_on(now);
                Some(HalfCycle::On)
            }
        }
    }

    /// A peer's ping arrived at `now`. Ignored before `begin`.
    pub fn record_ping(&mut self, now: u32) {
        match self.half {
            Some(HalfCycle::On) => self.window.record_on(now),
            Some(HalfCycle::Off) => self.window.record_off(now),
            None => {}
        }
    }

    pub fn half_cycle(&self) -> Option<HalfCycle> {
        self.half
    }

    pub fn adjustment(&self) -> PhaseAdjustment {
        self.adjustment
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn last_on_start(&self) -> Option<u32> {
        self.last_on_start
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
    }

    pub fn current_window(&self) -> &SyncWindow {
        &self.window
    }
}

/// The ClockSync pattern body. Any valid packet other than a ping ends it:
/// the first payload byte becomes the requested pattern and the body returns
/// Ok(()). Err(Preempted) when a checkpoint preempts it.
pub fn run_clock_sync<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    let cycle_base = node.config.sync.cycle_base_ms;
    node.status.reset_sync(cycle_base);

    // Stagger cold starts so nodes powered together don't begin aligned.
    node.set_color(LED_OFF);
    let jitter = node.random_up_to(node.config.sync.startup_jitter_ms);
    info!("[SYNC] entering clock sync, cycle_base={}ms, jitter={}ms", cycle_base, jitter);
    node.delay(jitter)?;

    let mut engine = SyncEngine::new(cycle_base);
    let now = node.clock.now_millis();
    engine.begin(now);
    enter_on(node);

    loop {
        let now = node.clock.now_millis();
        match engine.advance(now) {
            Some(HalfCycle::On) => {
                publish_cycle(node, &engine, now);
                enter_on(node);
            }
            Some(HalfCycle::Off) => node.set_color(LED_OFF),
            None => {}
        }

        match node.radio.poll_received() {
            Ok(Some(received)) => {
                node.report_packet(&received);
                match received.payload() {
                    Some(Payload::SyncPing) => {
                        let at = node.clock.now_millis();
                        engine.record_ping(at);
                        debug!("[SYNC] ping from node {} during {:?}", received.packet.node_id(), engine.half_cycle());
                    }
                    Some(Payload::Pattern(id)) => {
                        info!("[SYNC] pattern {} received from node {}, leaving clock sync", id, received.packet.node_id());
                        node.request_pattern(id);
                        return Ok(());
                    }
                    Some(Payload::Empty) => {
                        // Nothing to request: the scheduler re-enters ClockSync.
                        info!("[SYNC] empty packet from node {}, leaving clock sync", received.packet.node_id());
                        return Ok(());
                    }
                    None => node.note_dropped(&received),
                }
            }
            Ok(None) => node.clock.delay_millis(POLL_IDLE_MS),
            Err(e) => {
                warn!("[SYNC] receive failed: {:#}", e);
                node.clock.delay_millis(POLL_IDLE_MS);
            }
        }

        node.checkpoint_holding_radio()?;
    }
}

fn enter_on<R, C, L>(node: &mut Node<R, C, L>)
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    let [r, g, b] = node.config.sync.on_color;
    node.set_color((r, g, b));

    if !node.radio.can_send() {
        node.status.pings_skipped += 1;
        debug!("[SYNC] channel busy, ping skipped");
        return;
    }
    let header = node.broadcast_header();
    match node.radio.try_send(header, &[SYNC_PING]) {
        Ok(()) => node.status.pings_sent += 1,
        Err(e) => {
            node.status.pings_skipped += 1;
            debug!("[SYNC] ping send failed: {:#}", e);
        }
    }
}

fn publish_cycle<R, C, L>(node: &mut Node<R, C, L>, engine: &SyncEngine, now: u32)
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    let Some(report) = engine.last_report() else {
        return;
    };
    let status = &mut node.status;
    status.adjustment = report.adjustment;
    status.cycles = engine.cycles();
    status.last_on_pings = report.on.ping_count;
    status.last_off_pings = report.off.ping_count;
    status.updated_ms = now;

    info!(
        "[SYNC] cycle {}: on {} pings/{}ms, off {} pings/{}ms -> on+{}ms off+{}ms",
        engine.cycles(),
        report.on.ping_count,
        report.on.elapsed_sum,
        report.off.ping_count,
        report.off.elapsed_sum,
        report.adjustment.on_extra,
        report.adjustment.off_extra
    );
}
