//! The dispatch loop: device messages in, intents to the application out.
//!
//! One task owns the [`GestureRecognizer`]. It waits on the next device
//! message or an expired long-press timer, feeds it to the recognizer and
//! hands the resulting intents to an [`IntentHandler`]. Handlers never block
//! this loop on the network; they spawn.

pub mod bindings;
pub mod trackers;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::feedback::{animation, Feedback};
use crate::gesture::{GestureRecognizer, Intent, LongPressTimer};
use crate::protocol::DeviceMessage;

pub use bindings::Bindings;

/// Capacity of the queue expired long-press timers come back through.
pub const TIMER_CAPACITY: usize = 8;

/// Reacts to recognized gestures.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    /// Must return promptly; anything that waits on I/O is spawned.
    /// `Shutdown` is handled by the controller and never reaches here.
    async fn handle(&self, intent: Intent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// All three buttons held
    Chord,
    /// Ctrl+C / SIGTERM
    Signal,
}

pub struct Controller<H> {
    recognizer: GestureRecognizer,
    handler: H,
    feedback: Feedback,
    /// Cancelled when the loop exits; trackers and blinkers run on it.
    session: CancellationToken,
    shutdown: CancellationToken,
}

impl<H: IntentHandler> Controller<H> {
    pub fn new(
        recognizer: GestureRecognizer,
        handler: H,
        feedback: Feedback,
        session: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            recognizer,
            handler,
            feedback,
            session,
            shutdown,
        }
    }

    /// Run until the shutdown chord, a shutdown signal, or the end of the
    /// message stream (an error: the transport died).
    ///
    /// On a clean exit the outro has been handed to the transport when this
    /// returns.
    pub async fn run(mut self, mut messages: mpsc::Receiver<DeviceMessage>) -> Result<ExitReason> {
        let (timer_tx, mut timer_rx) = mpsc::channel(TIMER_CAPACITY);

        let outcome = loop {
            let reaction = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(ExitReason::Signal),
                msg = messages.recv() => match msg {
                    Some(msg) => self.recognizer.handle(&msg),
                    None => break Err(anyhow!("device message stream ended")),
                },
                Some(timer) = timer_rx.recv() => self.recognizer.long_press_elapsed(timer),
            };

            if let Some(timer) = reaction.timer {
                arm_long_press(&timer_tx, timer);
            }
            for intent in reaction.intents {
                if intent != Intent::Shutdown {
                    self.handler.handle(intent).await;
                }
            }
            if self.recognizer.is_terminated() {
                break Ok(ExitReason::Chord);
            }
        };

        self.session.cancel();
        if let Ok(reason) = &outcome {
            info!("Shutting down ({:?})", reason);
            animation::play(&self.feedback, &animation::outro(animation::FRAME_DELAY)).await;
            self.feedback.flush().await;
        }
        outcome
    }
}

/// Hand `timer` back to the loop once it expires. Never cancelled; the
/// recognizer discards stale ones.
fn arm_long_press(timers: &mpsc::Sender<LongPressTimer>, timer: LongPressTimer) {
    let timers = timers.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timer.after).await;
        if timers.send(timer).await.is_err() {
            debug!("Controller gone before long-press timer fired");
        }
    });
}
