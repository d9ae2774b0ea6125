//! The lantern node: hardware capabilities, scheduler state and the operator
//! console, handed by `&mut` to whichever pattern body is running.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::MonotonicClock;
use crate::command::{self, Command, CommandParser, HELP_TEXT};
use crate::config::{Band, SystemConfig, DEFAULT_FREQUENCY_OFFSET, FREQUENCY_OFFSET_MAX, FREQUENCY_OFFSET_MIN};
use crate::packet::{Payload, Received, MAX_PAYLOAD};
use crate::pattern::PatternId;
use crate::patterns;
use crate::scheduler::{BodyResult, Preempted, SchedulerState};
use crate::status::NodeStatus;
use crate::traits::{ConfigStore, Console, Led, Radio, Rgb};

/// Longest stretch a `Node::delay` sleeps without a checkpoint. Bounds the
/// latency of a mode switch for bodies that mostly wait.
pub const CHECKPOINT_SLICE_MS: u32 = 20;

/// Message waiting for the channel to become idle.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outgoing {
    header: u8,
    payload: Vec<u8>,
}

/// Serial console plus the configuration store it edits.
pub struct Operator {
    console: Box<dyn Console>,
    store: Box<dyn ConfigStore>,
    parser: CommandParser,
    pending: Option<Outgoing>,
    test_counter: u8,
    /// Print every packet the node receives.
    monitor: bool,
}

impl Operator {
    pub fn new(console: Box<dyn Console>, store: Box<dyn ConfigStore>) -> Self {
        Operator {
            console,
            store,
            parser: CommandParser::new(),
            pending: None,
            test_counter: 0,
            monitor: false,
        }
    }

    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    fn say(&mut self, text: &str) {
        self.console.write_str(text);
        self.console.write_str("\n");
    }
}

pub struct Node<R, C, L>
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    pub radio: R,
    pub clock: C,
    pub led: L,
    pub config: SystemConfig,
    pub status: NodeStatus,
    scheduler: SchedulerState,
    rng: StdRng,
    operator: Option<Operator>,
    stop: Arc<AtomicBool>,
}

impl<R, C, L> Node<R, C, L>
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    pub fn new(radio: R, clock: C, led: L, config: SystemConfig, rng: StdRng) -> Self {
        info!("=== Lantern node {} ===", config.node.describe());
        info!(
            "Sync: cycle_base={}ms, startup jitter<={}ms",
            config.sync.cycle_base_ms, config.sync.startup_jitter_ms
        );

        Node {
            radio,
            clock,
            led,
            config,
            status: NodeStatus::default(),
            scheduler: SchedulerState::default(),
            rng,
            operator: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    // ========================================================================
    // SCHEDULER
    // ========================================================================

    pub fn scheduler(&self) -> &SchedulerState {
        &self.scheduler
    }

    pub fn running_pattern(&self) -> PatternId {
        self.scheduler.running()
    }

    pub fn request_pattern(&mut self, id: PatternId) {
        self.scheduler.request_pattern(id);
    }

    /// Setting the flag makes the next checkpoint unwind the body and `run`
    /// return.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Dispatch pattern bodies until stopped.
    pub fn run(&mut self) {
        info!("[SCHED] starting with {}", self.scheduler.running());

        while !self.stopping() {
            // Promotes a request left by a body that returned on its own and
            // drops a stale one.
            self.scheduler.checkpoint();

            let id = self.scheduler.running();
            self.status.running = id;
            info!("[SCHED] dispatch {}", id);

            match patterns::dispatch(self, id) {
                Ok(()) => debug!("[SCHED] {} returned", id),
                Err(Preempted) => debug!("[SCHED] {} preempted", id),
            }
        }

        info!("[SCHED] stopped");
    }

    /// Preemption point for bodies that leave the radio to the node: services
    /// the console and pattern-change packets, then checks for a switch.
    pub fn checkpoint(&mut self) -> BodyResult {
        self.service_operator();
        self.service_radio();
        self.preemption_point()
    }

    /// Preemption point for a body that polls the radio itself.
    pub fn checkpoint_holding_radio(&mut self) -> BodyResult {
        self.service_operator();
        self.preemption_point()
    }

    fn preemption_point(&mut self) -> BodyResult {
        if self.stopping() || self.scheduler.checkpoint() {
            return Err(Preempted);
        }
        Ok(())
    }

    /// Sleep `ms`, checkpointing at least every `CHECKPOINT_SLICE_MS`.
    pub fn delay(&mut self, ms: u32) -> BodyResult {
        let mut left = ms;
        while left > 0 {
            let slice = left.min(CHECKPOINT_SLICE_MS);
            self.clock.delay_millis(slice);
            left -= slice;
            self.checkpoint()?;
        }
        Ok(())
    }

    // ========================================================================
    // HARDWARE HELPERS
    // ========================================================================

    pub fn set_color(&mut self, (r, g, b): Rgb) {
        self.led.set_color(r, g, b);
    }

    /// Uniform in `[0, max]`.
    pub fn random_up_to(&mut self, max: u32) -> u32 {
        self.rng.random_range(0..=max)
    }

    /// Uniform in `[low, high)`.
    pub fn random_between(&mut self, low: u32, high: u32) -> u32 {
        self.rng.random_range(low..high)
    }

    /// Header for our own broadcasts.
    pub fn broadcast_header(&self) -> u8 {
        command::send_header(self.config.node.node_id, 0)
    }

    pub fn note_dropped(&mut self, received: &Received) {
        self.status.packets_dropped += 1;
        debug!(
            "[RADIO] dropped packet hdr={:#04x} len={} crc_ok={}",
            received.packet.header,
            received.packet.payload.len(),
            received.crc_ok
        );
    }

    /// Echo a received packet on the console when monitoring.
    pub fn report_packet(&mut self, received: &Received) {
        let node_config = &self.config.node;
        if let Some(op) = self.operator.as_mut() {
            if op.monitor {
                if let Some(line) = command::format_report(received, node_config) {
                    op.say(&line);
                }
            }
        }
    }

    /// Pattern-change packets for bodies that don't own the radio. Pings are
    /// meaningless outside ClockSync and are ignored.
    fn service_radio(&mut self) {
        loop {
            let received = match self.radio.poll_received() {
                Ok(Some(rx)) => rx,
                Ok(None) => return,
                Err(e) => {
                    warn!("[RADIO] receive failed: {:#}", e);
                    return;
                }
            };

            self.report_packet(&received);
            match received.payload() {
                Some(Payload::SyncPing) => {}
                Some(Payload::Pattern(id)) => {
                    info!("[RADIO] pattern {} requested by node {}", id, received.packet.node_id());
                    self.scheduler.request_pattern(id);
                }
                Some(Payload::Empty) | None => self.note_dropped(&received),
            }
        }
    }

    // ========================================================================
    // OPERATOR CONSOLE
    // ========================================================================

    fn service_operator(&mut self) {
        let Some(op) = self.operator.as_mut() else {
            return;
        };

        let mut commands = Vec::new();
        while let Some(byte) = op.console.read_byte() {
            let parsed = op.parser.feed(byte);
            if let Some(echo) = parsed.echo {
                op.say(&echo);
            }
            if let Some(cmd) = parsed.command {
                commands.push(cmd);
            }
        }

        for cmd in commands {
            self.apply_command(cmd);
        }
        self.flush_outgoing();
    }

    fn flush_outgoing(&mut self) {
        let Some(op) = self.operator.as_mut() else {
            return;
        };
        if op.pending.is_none() || !self.radio.can_send() {
            return;
        }
        if let Some(msg) = op.pending.take() {
            match self.radio.try_send(msg.header, &msg.payload) {
                Ok(()) => debug!("[CMD] sent {} bytes hdr={:#04x}", msg.payload.len(), msg.header),
                Err(e) => warn!("[CMD] send failed: {:#}", e),
            }
        }
    }

    fn queue_send(&mut self, header: u8, payload: Vec<u8>) {
        if let Some(op) = self.operator.as_mut() {
            if op.pending.replace(Outgoing { header, payload }).is_some() {
                debug!("[CMD] unsent message replaced");
            }
        }
    }

    /// Persist the configuration and re-initialize the radio with it.
    fn save_config(&mut self) {
        let config = self.config.clone();
        if let Some(op) = self.operator.as_mut() {
            if let Err(e) = op.store.save(&config) {
                warn!("[CMD] config save failed: {:#}", e);
                op.say("config save failed");
            }
        }
        if let Err(e) = self.radio.reconfigure(&config.node) {
            warn!("[RADIO] reconfigure failed: {:#}", e);
            self.say("radio reconfigure failed");
        }
        info!("[CMD] config now {}", self.config.node.describe());
    }

    fn say(&mut self, text: &str) {
        if let Some(op) = self.operator.as_mut() {
            op.say(text);
        }
    }

    pub fn apply_command(&mut self, cmd: Command) {
        debug!("[CMD] {:?}", cmd);
        match cmd {
            Command::SetNodeId(id) => {
                self.config.node.node_id = id;
                self.save_config();
            }
            Command::SetBand(code) => {
                if let Some(band) = Band::from_code(code) {
                    self.config.node.band = band;
                    self.config.node.frequency_offset = DEFAULT_FREQUENCY_OFFSET;
                    self.save_config();
                }
            }
            Command::SetFrequencyOffset(offset) => {
                if (u32::from(FREQUENCY_OFFSET_MIN)..=u32::from(FREQUENCY_OFFSET_MAX)).contains(&offset) {
                    self.config.node.frequency_offset = offset as u16;
                    self.save_config();
                }
            }
            Command::SetGroup(group) => {
                self.config.node.group = group;
                self.save_config();
            }
            Command::SetCollectMode(on) => {
                self.config.node.collect_mode = on;
                self.save_config();
            }
            Command::SetQuietMode(on) => {
                self.config.node.quiet_mode = on;
                self.save_config();
            }
            Command::SetHexOutput(mode) => {
                self.config.node.hex_output = mode;
                self.save_config();
            }
            Command::SelectPattern(value) => match u8::try_from(value).ok().and_then(PatternId::from_byte) {
                Some(id) => {
                    info!("[CMD] pattern {} selected, broadcasting", id);
                    self.scheduler.request_pattern(id);
                    let header = self.broadcast_header();
                    self.queue_send(header, vec![id.as_byte()]);
                }
                None => self.say(&format!("unknown pattern {}", value)),
            },
            Command::TestPacket => {
                let counter = self.operator.as_ref().map_or(0, |op| op.test_counter);
                let payload: Vec<u8> = (0..MAX_PAYLOAD as u8).map(|i| i.wrapping_add(counter)).collect();
                if let Some(op) = self.operator.as_mut() {
                    op.test_counter = op.test_counter.wrapping_add(1);
                }
                self.say(&format!("test {}", counter));
                let header = self.broadcast_header();
                self.queue_send(header, payload);
            }
            Command::Send { dest, data } => {
                let header = command::send_header(self.config.node.node_id, dest);
                self.queue_send(header, data);
            }
            Command::Version => {
                let status = serde_json::to_string(&self.status).unwrap_or_else(|e| format!("<{}>", e));
                let text = format!(
                    "{}\n{}\nrunning {}\n{}",
                    command::version_line(),
                    self.config.node.describe(),
                    self.scheduler.running(),
                    status
                );
                self.say(&text);
            }
            Command::Help => {
                let text = format!("{}Current configuration:\n{}", HELP_TEXT, self.config.node.describe());
                self.say(&text);
            }
        }
    }
}
