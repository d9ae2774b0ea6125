pub mod host;

pub use host::HostClock;

/// Millisecond uptime counter. Wraps at `u32::MAX`; compare instants with
/// `wrapping_sub`, never with `<`.
pub trait MonotonicClock {
    fn now_millis(&self) -> u32;

    /// Block for `ms` milliseconds. Bodies never call this directly for long
    /// waits; they go through `Node::delay` so checkpoints keep running.
    fn delay_millis(&mut self, ms: u32);
}

/// Milliseconds elapsed from `since` to `now`, correct across one wrap.
pub fn elapsed_since(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}
