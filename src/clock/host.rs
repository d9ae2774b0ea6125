use super::MonotonicClock;
use std::thread;
use std::time::{Duration, Instant};

pub struct HostClock {
    boot: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        HostClock { boot: Instant::now() }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for HostClock {
    fn now_millis(&self) -> u32 {
        // Truncation is the wrap: same behavior as the 32-bit millis() counter.
        self.boot.elapsed().as_millis() as u32
    }

    fn delay_millis(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
