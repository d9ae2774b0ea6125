#![allow(dead_code)]

use fireflysync::clock::MonotonicClock;
use fireflysync::config::SystemConfig;
use fireflysync::node::{Node, Operator};
use fireflysync::sim::{MemoryConfigStore, RecordingLed, ScriptedConsole, ScriptedRadio, SimClock};
use fireflysync::traits::Rgb;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub type SimNode = Node<ScriptedRadio, SimClock, RecordingLed>;

/// Handles onto the simulated hardware of one node.
pub struct Rig {
    pub clock: SimClock,
    pub radio: ScriptedRadio,
    pub led: RecordingLed,
    pub console: ScriptedConsole,
    pub store: MemoryConfigStore,
}

impl Rig {
    pub fn new() -> Self {
        let clock = SimClock::new();
        Rig {
            radio: ScriptedRadio::new(&clock),
            led: RecordingLed::new(&clock),
            console: ScriptedConsole::new(&clock),
            store: MemoryConfigStore::new(),
            clock,
        }
    }

    /// A node with an operator console that stops itself at `stop_at_ms`.
    pub fn node(&self, config: SystemConfig, stop_at_ms: u32) -> SimNode {
        let operator = Operator::new(Box::new(self.console.clone()), Box::new(self.store.clone()));
        let mut node = Node::new(
            self.radio.clone(),
            self.clock.clone(),
            self.led.clone(),
            config,
            StdRng::seed_from_u64(7),
        )
        .with_operator(operator);
        let stop = node.stop_handle();
        node.clock.set_stop(stop_at_ms, stop);
        node
    }

    pub fn clock_now(&self) -> u32 {
        self.clock.now_millis()
    }

    /// First time the LED was set to `color`.
    pub fn first_time_of(&self, color: Rgb) -> Option<u32> {
        self.led.history().into_iter().find(|&(_, c)| c == color).map(|(t, _)| t)
    }

    pub fn times_of(&self, color: Rgb) -> Vec<u32> {
        self.led.history().into_iter().filter(|&(_, c)| c == color).map(|(t, _)| t).collect()
    }
}

/// Default configuration without the random entry delay.
pub fn no_jitter() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.sync.startup_jitter_ms = 0;
    config
}
