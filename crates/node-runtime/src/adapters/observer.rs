//! Wakes the simulation runner of a channel whenever an input for it lands.

use parking_lot::RwLock;
use rc_04_message_log::InputObserver;
use rc_05_simulation::SimulationRunner;
use shared_types::{ChannelId, PeerId, Round};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct RunnerWakeObserver {
    runners: RwLock<HashMap<ChannelId, Arc<SimulationRunner>>>,
}

impl RunnerWakeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: ChannelId, runner: Arc<SimulationRunner>) {
        self.runners.write().insert(channel, runner);
    }

    pub fn unregister(&self, channel: &ChannelId) {
        self.runners.write().remove(channel);
    }
}

impl InputObserver for RunnerWakeObserver {
    fn on_input(&self, channel: &ChannelId, _round: Round, _peer: &PeerId) {
        if let Some(runner) = self.runners.read().get(channel) {
            runner.wake();
        }
    }
}
