//! Deterministic stand-ins for the hardware, and a multi-node swarm.
//!
//! All simulated devices share one `SimClock`; time only moves when a body
//! sleeps, so a run is a pure function of its script and seed.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::MonotonicClock;
use crate::config::{NodeConfig, SystemConfig};
use crate::packet::{Packet, Received};
use crate::phase::PhaseAdjustment;
use crate::sync::{HalfCycle, SyncEngine};
use crate::traits::{ConfigStore, Console, Led, Radio, Rgb};

// ============================================================================
// CLOCK
// ============================================================================

/// Virtual millisecond clock. Clones share the same time.
#[derive(Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
    stop_at: Option<(u32, Arc<AtomicBool>)>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u32) -> Self {
        let clock = Self::default();
        clock.now.set(ms);
        clock
    }

    /// Raise `flag` once the clock reaches `ms`; used to end a node run.
    pub fn stop_at(mut self, ms: u32, flag: Arc<AtomicBool>) -> Self {
        self.stop_at = Some((ms, flag));
        self
    }

    pub fn set_stop(&mut self, ms: u32, flag: Arc<AtomicBool>) {
        self.stop_at = Some((ms, flag));
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl MonotonicClock for SimClock {
    fn now_millis(&self) -> u32 {
        self.now.get()
    }

    fn delay_millis(&mut self, ms: u32) {
        self.advance(ms);
        if let Some((at, flag)) = &self.stop_at {
            if self.now.get().wrapping_sub(*at) < u32::MAX / 2 {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

// ============================================================================
// RADIO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub at: u32,
    pub header: u8,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct RadioLog {
    inbox: VecDeque<(u32, Received)>,
    sent: Vec<SentPacket>,
    configured: Vec<NodeConfig>,
    busy: bool,
}

/// Radio that delivers scripted packets once the clock reaches their time
/// and records everything sent. Clones share state.
#[derive(Clone)]
pub struct ScriptedRadio {
    clock: SimClock,
    log: Rc<RefCell<RadioLog>>,
}

impl ScriptedRadio {
    pub fn new(clock: &SimClock) -> Self {
        ScriptedRadio { clock: clock.clone(), log: Rc::default() }
    }

    /// Queue `received` for delivery at `at`. Keep calls in time order.
    pub fn deliver_at(&self, at: u32, received: Received) {
        self.log.borrow_mut().inbox.push_back((at, received));
    }

    pub fn deliver_packet_at(&self, at: u32, packet: Packet) {
        self.deliver_at(at, Received::valid(packet));
    }

    pub fn set_busy(&self, busy: bool) {
        self.log.borrow_mut().busy = busy;
    }

    pub fn sent(&self) -> Vec<SentPacket> {
        self.log.borrow().sent.clone()
    }

    pub fn pending(&self) -> usize {
        self.log.borrow().inbox.len()
    }

    /// Every configuration applied through `reconfigure`, oldest first.
    pub fn configured(&self) -> Vec<NodeConfig> {
        self.log.borrow().configured.clone()
    }
}

impl Radio for ScriptedRadio {
    fn can_send(&self) -> bool {
        !self.log.borrow().busy
    }

    fn try_send(&mut self, header: u8, payload: &[u8]) -> Result<()> {
        let mut log = self.log.borrow_mut();
        if log.busy {
            bail!("channel busy");
        }
        log.sent.push(SentPacket { at: self.clock.now_millis(), header, payload: payload.to_vec() });
        Ok(())
    }

    fn poll_received(&mut self) -> Result<Option<Received>> {
        let now = self.clock.now_millis();
        let mut log = self.log.borrow_mut();
        match log.inbox.front() {
            Some((at, _)) if now.wrapping_sub(*at) < u32::MAX / 2 => Ok(log.inbox.pop_front().map(|(_, rx)| rx)),
            _ => Ok(None),
        }
    }

    fn reconfigure(&mut self, config: &NodeConfig) -> Result<()> {
        self.log.borrow_mut().configured.push(config.clone());
        Ok(())
    }
}

// ============================================================================
// LED, CONSOLE, STORE
// ============================================================================

/// Records every color set, with the time it was set.
#[derive(Clone)]
pub struct RecordingLed {
    clock: SimClock,
    history: Rc<RefCell<Vec<(u32, Rgb)>>>,
}

impl RecordingLed {
    pub fn new(clock: &SimClock) -> Self {
        RecordingLed { clock: clock.clone(), history: Rc::default() }
    }

    pub fn history(&self) -> Vec<(u32, Rgb)> {
        self.history.borrow().clone()
    }

    pub fn last(&self) -> Option<Rgb> {
        self.history.borrow().last().map(|&(_, rgb)| rgb)
    }
}

impl Led for RecordingLed {
    fn set_color(&mut self, r: u8, g: u8, b: u8) {
        self.history.borrow_mut().push((self.clock.now_millis(), (r, g, b)));
    }
}

/// Console fed from a timed byte script; output is captured.
#[derive(Clone)]
pub struct ScriptedConsole {
    clock: SimClock,
    input: Rc<RefCell<VecDeque<(u32, u8)>>>,
    output: Rc<RefCell<String>>,
}

impl ScriptedConsole {
    pub fn new(clock: &SimClock) -> Self {
        ScriptedConsole { clock: clock.clone(), input: Rc::default(), output: Rc::default() }
    }

    /// Make `text` readable from `at` onwards.
    pub fn type_at(&self, at: u32, text: &str) {
        self.input.borrow_mut().extend(text.bytes().map(|b| (at, b)));
    }

    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }
}

impl Console for ScriptedConsole {
    fn read_byte(&mut self) -> Option<u8> {
        let now = self.clock.now_millis();
        let mut input = self.input.borrow_mut();
        match input.front() {
            Some(&(at, _)) if now.wrapping_sub(at) < u32::MAX / 2 => input.pop_front().map(|(_, b)| b),
            _ => None,
        }
    }

    fn write_str(&mut self, s: &str) {
        self.output.borrow_mut().push_str(s);
    }
}

/// In-memory configuration store. Clones share the saved value.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    saved: Rc<RefCell<Option<SystemConfig>>>,
    saves: Rc<Cell<u32>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<SystemConfig> {
        self.saved.borrow().clone()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.get()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<SystemConfig> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&mut self, config: &SystemConfig) -> Result<()> {
        *self.saved.borrow_mut() = Some(config.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// ============================================================================
// SWARM
// ============================================================================

struct SwarmNode {
    engine: SyncEngine,
    start_ms: u32,
}

/// Several sync engines on one noiseless timeline. Each millisecond every
/// node begins or advances; every node that opens an ON window pings, and
/// the ping reaches every other running node within the same millisecond
/// unless dropped with probability `loss`.
pub struct Swarm {
    nodes: Vec<SwarmNode>,
    cycle_base: u32,
    now: u32,
    loss: f64,
    rng: StdRng,
    pings_sent: u64,
    pings_lost: u64,
}

impl Swarm {
    pub fn new(cycle_base: u32, start_offsets: &[u32], loss: f64, seed: u64) -> Self {
        let nodes = start_offsets
            .iter()
            .map(|&start_ms| SwarmNode { engine: SyncEngine::new(cycle_base), start_ms })
            .collect();
        Swarm {
            nodes,
            cycle_base,
            now: 0,
            loss,
            rng: StdRng::seed_from_u64(seed),
            pings_sent: 0,
            pings_lost: 0,
        }
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn engine(&self, index: usize) -> &SyncEngine {
        &self.nodes[index].engine
    }

    pub fn adjustments(&self) -> Vec<PhaseAdjustment> {
        self.nodes.iter().map(|n| n.engine.adjustment()).collect()
    }

    pub fn min_cycles(&self) -> u32 {
        self.nodes.iter().map(|n| n.engine.cycles()).min().unwrap_or(0)
    }

    pub fn pings(&self) -> (u64, u64) {
        (self.pings_sent, self.pings_lost)
    }

    pub fn step(&mut self) {
        let now = self.now;
        let mut senders = Vec::new();

        for (i, node) in self.nodes.iter_mut().enumerate() {
            let opened = match node.engine.half_cycle() {
                None if now >= node.start_ms => Some(node.engine.begin(now)),
                None => None,
                Some(_) => node.engine.advance(now),
            };
            if opened == Some(HalfCycle::On) {
                senders.push(i);
            }
        }

        for sender in senders {
            self.pings_sent += 1;
            for (j, node) in self.nodes.iter_mut().enumerate() {
                if j == sender || node.engine.half_cycle().is_none() {
                    continue;
                }
                if self.loss > 0.0 && self.rng.random::<f64>() < self.loss {
                    self.pings_lost += 1;
                    continue;
                }
                node.engine.record_ping(now);
            }
        }

        self.now += 1;
    }

    pub fn run_for(&mut self, ms: u32) {
        for _ in 0..ms {
            self.step();
        }
    }

    /// Step until every node has completed `cycles` full cycles.
    pub fn run_until_cycles(&mut self, cycles: u32) {
        while self.min_cycles() < cycles {
            self.step();
        }
    }

    /// Width of the smallest arc of the nominal cycle (`2 * cycle_base`) that
    /// holds every node's latest ON start. 0 means perfectly in phase, and a
    /// zero-length cycle has no phase to spread over.
    pub fn phase_spread(&self) -> u32 {
        let period = self.cycle_base.saturating_mul(2);
        if period == 0 {
            return 0;
        }
        let mut phases: Vec<u32> = self
            .nodes
            .iter()
            .filter_map(|n| n.engine.last_on_start())
            .map(|t| t % period)
            .collect();
        if phases.len() < 2 {
            return 0;
        }
        phases.sort_unstable();

        let wrap_gap = phases[0] + period - phases[phases.len() - 1];
        let largest_gap = phases.windows(2).map(|w| w[1] - w[0]).fold(wrap_gap, u32::max);
        period - largest_gap
    }
}
