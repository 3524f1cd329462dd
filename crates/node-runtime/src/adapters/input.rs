//! Scripted local input for unattended sessions.
//!
//! Holds a random heading for a while, then picks a new one. Seeded, so two
//! runs with the same seed press the same buttons.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rc_05_simulation::domain::arena::{DOWN, LEFT, RIGHT, STOP, UP};
use rc_06_sequencer::InputSource;
use shared_types::InputBits;

const HEADINGS: [InputBits; 9] = [
    UP,
    DOWN,
    LEFT,
    RIGHT,
    UP | LEFT,
    UP | RIGHT,
    DOWN | LEFT,
    DOWN | RIGHT,
    STOP,
];

struct Script {
    rng: StdRng,
    current: InputBits,
    remaining: u64,
}

pub struct ScriptedInput {
    hold: u64,
    script: Mutex<Script>,
}

impl ScriptedInput {
    /// `hold` is the number of reads a heading is kept for.
    pub fn new(seed: u64, hold: u64) -> Self {
        Self {
            hold: hold.max(1),
            script: Mutex::new(Script {
                rng: StdRng::seed_from_u64(seed),
                current: 0,
                remaining: 0,
            }),
        }
    }
}

impl InputSource for ScriptedInput {
    fn current_input(&self) -> InputBits {
        let mut script = self.script.lock();
        if script.remaining == 0 {
            let pick = script.rng.gen_range(0..HEADINGS.len());
            script.current = HEADINGS[pick];
            script.remaining = self.hold;
        }
        script.remaining -= 1;
        script.current
    }
}
