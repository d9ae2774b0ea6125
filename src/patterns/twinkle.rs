use log::debug;

use super::LED_OFF;
use crate::clock::MonotonicClock;
use crate::node::Node;
use crate::scheduler::BodyResult;
use crate::traits::{Led, Radio, Rgb};

const TWINKLE_ON: Rgb = (232, 232, 232);
const ON_MS: (u32, u32) = (500, 900);
const OFF_MS: (u32, u32) = (1500, 6999);

/// Random blinks: short flashes separated by long, random dark spells.
pub fn run_twinkle<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    loop {
        let on_ms = node.random_between(ON_MS.0, ON_MS.1);
        node.set_color(TWINKLE_ON);
        node.delay(on_ms)?;

        let off_ms = node.random_between(OFF_MS.0, OFF_MS.1);
        debug!("twinkle: on {}ms, off {}ms", on_ms, off_ms);
        node.set_color(LED_OFF);
        node.delay(off_ms)?;
    }
}
