//! Drives a simulation: cue on every round tick and whenever a new input is
//! stored, and publish the newest state to watchers.

use crate::ports::SimulationApi;
use parking_lot::Mutex;
use shared_types::{Round, SerializedState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SUBSYSTEM: &str = "simulation_runner";

pub struct SimulationRunner {
    simulation: Arc<dyn SimulationApi>,
    interval: Duration,
    wake: Arc<Notify>,
    states: watch::Sender<Option<SerializedState>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationRunner {
    pub fn new(simulation: Arc<dyn SimulationApi>, interval: Duration) -> Self {
        let (states, _) = watch::channel(simulation.latest_state());
        let (shutdown, _) = watch::channel(false);
        Self {
            simulation,
            interval,
            wake: Arc::new(Notify::new()),
            states,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Request a cue ahead of the next tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SerializedState>> {
        self.states.subscribe()
    }

    /// Spawn the driving loop. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let simulation = Arc::clone(&self.simulation);
        let wake = Arc::clone(&self.wake);
        let states = self.states.clone();
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wake.notified() => {}
                    _ = shutdown.changed() => break,
                }
                // A cue replays from the store under its lock; keep it off the
                // async workers. Failures are logged and counted by the
                // simulation and the next tick retries.
                let sim = Arc::clone(&simulation);
                match tokio::task::spawn_blocking(move || sim.cue(Round::MAX)).await {
                    Ok(Ok(Some(state))) => publish(&states, state),
                    Ok(_) => {}
                    Err(e) => warn!(subsystem = SUBSYSTEM, error = %e, "Cue task failed"),
                }
            }
            debug!(subsystem = SUBSYSTEM, "Runner stopped");
        }));
        info!(subsystem = SUBSYSTEM, interval_ms = interval.as_millis() as u64, "Runner started");
    }

    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn publish(states: &watch::Sender<Option<SerializedState>>, state: SerializedState) {
    states.send_if_modified(|current| {
        if current.as_ref() == Some(&state) {
            return false;
        }
        *current = Some(state);
        true
    });
}
