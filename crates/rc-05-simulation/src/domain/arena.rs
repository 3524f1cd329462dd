//! A small top-down arena used by the local session and the tests.
//!
//! Each player steers an avatar on a bounded integer grid. Input bits set a
//! heading that persists until the next nonzero input, so a zero input
//! (including a dropped, unconfirmed one) means "no new command".

use crate::ports::GameModule;
use serde::{Deserialize, Serialize};
use shared_types::{PeerId, PlayerInput};

pub const UP: u32 = 1;
pub const DOWN: u32 = 1 << 1;
pub const LEFT: u32 = 1 << 2;
pub const RIGHT: u32 = 1 << 3;
pub const STOP: u32 = 1 << 4;

/// Side length of the square arena.
pub const ARENA_SIZE: i32 = 1_000;
/// Units per second.
const SPEED: f64 = 200.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaState {
    pub steps: u64,
    /// Sorted by peer id.
    pub avatars: Vec<Avatar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub peer: PeerId,
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

impl Avatar {
    fn spawn(peer: PeerId) -> Self {
        let bytes = peer.as_bytes();
        let coord = |hi: u8, lo: u8| i32::from(u16::from_be_bytes([hi, lo])) % ARENA_SIZE;
        Self {
            peer,
            x: coord(bytes[0], bytes[1]),
            y: coord(bytes[2], bytes[3]),
            dx: 0,
            dy: 0,
        }
    }

    fn steer(&mut self, bits: u32) {
        if bits == 0 {
            return;
        }
        if bits & STOP != 0 {
            self.dx = 0;
            self.dy = 0;
            return;
        }
        self.dx = i32::from(bits & RIGHT != 0) - i32::from(bits & LEFT != 0);
        self.dy = i32::from(bits & DOWN != 0) - i32::from(bits & UP != 0);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaGame;

impl ArenaGame {
    pub fn decode(data: &[u8]) -> Result<ArenaState, String> {
        if data.is_empty() {
            return Ok(ArenaState::default());
        }
        bincode::deserialize(data).map_err(|e| e.to_string())
    }

    fn encode(state: &ArenaState) -> Result<Vec<u8>, String> {
        bincode::serialize(state).map_err(|e| e.to_string())
    }
}

impl GameModule for ArenaGame {
    fn initial_state(&self) -> Vec<u8> {
        // An empty arena always encodes.
        Self::encode(&ArenaState::default()).unwrap_or_default()
    }

    fn step(&self, data: &[u8], inputs: &[PlayerInput], dt: f64) -> Result<Vec<u8>, String> {
        let previous = Self::decode(data)?;
        let distance = (SPEED * dt).round() as i32;

        let mut avatars = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut avatar = previous
                .avatars
                .iter()
                .find(|a| a.peer == input.peer)
                .cloned()
                .unwrap_or_else(|| Avatar::spawn(input.peer));
            avatar.steer(input.data);
            avatar.x = (avatar.x + avatar.dx * distance).clamp(0, ARENA_SIZE);
            avatar.y = (avatar.y + avatar.dy * distance).clamp(0, ARENA_SIZE);
            avatars.push(avatar);
        }
        avatars.sort_by(|a, b| a.peer.cmp(&b.peer));

        Self::encode(&ArenaState {
            steps: previous.steps + 1,
            avatars,
        })
    }
}
