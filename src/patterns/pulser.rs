use crate::clock::MonotonicClock;
use crate::node::Node;
use crate::scheduler::BodyResult;
use crate::traits::{Led, Radio};

/// Per-step delay; raise to slow the color wheel down.
const PULSE_STEP_MS: u32 = 5;

#[derive(Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

/// One ramp of a single channel; the other two hold.
const RAMPS: [(Channel, bool); 6] = [
    (Channel::Red, true),    // blue -> violet
    (Channel::Blue, false),  // violet -> red
    (Channel::Green, true),  // red -> yellow
    (Channel::Red, false),   // yellow -> green
    (Channel::Blue, true),   // green -> teal
    (Channel::Green, false), // teal -> blue
];

/// Smooth walk around the color wheel, one channel at a time.
pub fn run_pulser<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    let mut rgb = [0u8, 0, 255];
    loop {
        for (channel, rising) in RAMPS {
            let index = channel as usize;
            for step in 0..=255u8 {
                rgb[index] = if rising { step } else { 255 - step };
                node.set_color((rgb[0], rgb[1], rgb[2]));
                node.delay(PULSE_STEP_MS)?;
            }
        }
    }
}
