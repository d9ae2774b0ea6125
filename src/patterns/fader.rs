//! Smooth color cycling along the edges and diagonals of the RGB cube.
//!
//! Each vertex of the unit cube is a color (scaled to `MIN_LEVEL..=MAX_LEVEL`);
//! walking a straight line between two vertices gives a smooth fade. `PATH`
//! lists the vertices to visit, two per byte (high nibble first).

use crate::clock::MonotonicClock;
use crate::node::Node;
use crate::scheduler::BodyResult;
use crate::traits::{Led, Radio};

/// Lowest level the LED visibly responds to.
const MIN_LEVEL: u8 = 10;
const MAX_LEVEL: u8 = 255;

const TRANSITION_STEP_MS: u32 = 70;
const TRAVERSE_REST_MS: u32 = 500;

const VERTEX: [[u8; 3]; 8] = [
    [0, 0, 0], // A
    [0, 1, 0], // B
    [0, 1, 1], // C
    [0, 0, 1], // D
    [1, 0, 0], // E
    [1, 1, 0], // F
    [1, 1, 1], // G
    [1, 0, 1], // H
];

const PATH: [u8; 18] = [
    0x01, 0x23, 0x76, 0x54, 0x03, 0x21, 0x56, 0x74, // edges
    0x13, 0x64, 0x16, 0x02, 0x75, 0x24, 0x35, 0x17, 0x25, 0x70, // diagonals
];

fn level(bit: u8) -> u8 {
    if bit == 0 {
        MIN_LEVEL
    } else {
        MAX_LEVEL
    }
}

/// Vertex indices in visiting order.
fn path_vertices() -> impl Iterator<Item = usize> {
    PATH.iter().flat_map(|&byte| [usize::from(byte >> 4), usize::from(byte & 0x0F)])
}

fn delta(from: usize, to: usize) -> [i16; 3] {
    let mut d = [0i16; 3];
    for (axis, slot) in d.iter_mut().enumerate() {
        *slot = i16::from(VERTEX[to][axis]) - i16::from(VERTEX[from][axis]);
    }
    d
}

pub fn run_fader<R, C, L>(node: &mut Node<R, C, L>) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    loop {
        let mut current = 0usize;
        let mut color = VERTEX[current].map(level);

        for next in path_vertices() {
            traverse(node, &mut color, delta(current, next))?;
            current = next;
        }
    }
}

/// Walk from the current color to the next vertex; all channels arrive
/// together.
fn traverse<R, C, L>(node: &mut Node<R, C, L>, color: &mut [u8; 3], d: [i16; 3]) -> BodyResult
where
    R: Radio,
    C: MonotonicClock,
    L: Led,
{
    if d == [0, 0, 0] {
        return Ok(());
    }

    for _ in 0..(MAX_LEVEL - MIN_LEVEL) {
        for (c, step) in color.iter_mut().zip(d) {
            *c = (i16::from(*c) + step).clamp(0, 255) as u8;
        }
        node.set_color((color[0], color[1], color[2]));
        node.delay(TRANSITION_STEP_MS)?;
    }

    node.delay(TRAVERSE_REST_MS)
}
