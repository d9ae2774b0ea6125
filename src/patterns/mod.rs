//! Pattern bodies and the dispatch table.
//!
//! Every body loops until a checkpoint reports preemption and propagates it
//! with `?`. None of them keeps state across dispatches.

mod fader;
mod pulser;
mod twinkle;

use log::warn;

use crate::clock::MonotonicClock;
use crate::node::Node;
use crate::pattern::PatternId;
use crate::scheduler::BodyResult;
use crate::sync;
use crate::traits::{Led, Radio, Rgb};

pub use fader::run_fader;
pub use pulser::run_pulser;
pub use twinkle::run_twinkle;

pub const LED_OFF: Rgb = (0, 0, 0);

/// How long the idle bodies sleep between checkpoints.
const IDLE_SLICE_MS: u32 = 100;

pub fn dispatch<R, C, L>(node: &mut Node<R, C, L>, id: PatternId) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    match id {
        PatternId::Off => run_off(node),
        PatternId::Twinkle => run_twinkle(node),
        PatternId::Firefly => run_hold(node),
        PatternId::Fader => run_fader(node),
        PatternId::Pulser => run_pulser(node),
        PatternId::ClockSync => sync::run_clock_sync(node),
        PatternId::SyncPing | PatternId::LuxMeter | PatternId::Other(_) => {
            warn!("[SCHED] {} has no body on this node, going dark", id);
            run_off(node)
        }
    }
}

/// All lights off until preempted.
pub fn run_off<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    node.set_color(LED_OFF);
    loop {
        node.delay(IDLE_SLICE_MS)?;
    }
}

/// Team firefly: leaves the LED as the previous pattern set it.
pub fn run_hold<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    loop {
        node.delay(IDLE_SLICE_MS)?;
    }
}
