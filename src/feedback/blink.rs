//! Blinking LEDs driven by tracker-owned state.
//!
//! A [`Blinker`] ticks every 150 ms, renders its state together with the
//! current phase into on/off LED values and sends only what changed since the
//! previous tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Feedback;
use crate::protocol::{Command, Led};

pub const BLINK_INTERVAL: Duration = Duration::from_millis(150);

/// State that knows how to draw itself on single-color LEDs.
pub trait BlinkPattern: Send + 'static {
    /// LED values for this tick. `phase` flips on every tick.
    fn render(&self, phase: bool) -> Vec<(Led, bool)>;
}

/// Handle for updating a running blinker's state.
pub struct Blinker<S> {
    state: Arc<Mutex<S>>,
    task: JoinHandle<()>,
}

impl<S: BlinkPattern> Blinker<S> {
    pub fn spawn(initial: S, feedback: Feedback, shutdown: CancellationToken) -> Self {
        Self::spawn_with_interval(initial, feedback, shutdown, BLINK_INTERVAL)
    }

    pub fn spawn_with_interval(
        initial: S,
        feedback: Feedback,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        let state = Arc::new(Mutex::new(initial));
        let task = tokio::spawn(run(state.clone(), feedback, shutdown, interval));
        Self { state, task }
    }

    /// Change the state; the next tick picks it up.
    pub async fn update(&self, f: impl FnOnce(&mut S)) {
        let mut state = self.state.lock().await;
        f(&mut state);
    }

    /// Wait for the blink loop to finish after shutdown.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            debug!("Blinker task ended abnormally: {}", e);
        }
    }
}

async fn run<S: BlinkPattern>(
    state: Arc<Mutex<S>>,
    feedback: Feedback,
    shutdown: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut phase = false;
    let mut shown: HashMap<Led, bool> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                phase = !phase;
                let frame = {
                    let state = state.lock().await;
                    state.render(phase)
                };
                for (led, on) in frame {
                    if shown.get(&led) == Some(&on) {
                        continue;
                    }
                    feedback.send(Command::toggle(led, on)).await;
                    shown.insert(led, on);
                }
            }
        }
    }
}
