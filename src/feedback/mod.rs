//! LED feedback: the single owner of the command path to the panel.
//!
//! Every producer (gesture actions, trackers, blinkers, animations) talks to
//! one [`Multiplexer`] task through a cloneable [`Feedback`] handle. The
//! multiplexer keeps, per LED, the steady state the trackers want shown plus
//! the suppression flags that let a flash or a held gesture temporarily
//! override it. Because only the multiplexer reads and writes those flags
//! there is nothing to lock and no stale restore can win a race.

pub mod animation;
pub mod blink;

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{Color, Command, Led};

/// Capacity of the request queue in front of the multiplexer.
pub const REQUEST_CAPACITY: usize = 32;

/// What an LED shows when nothing overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedState {
    #[default]
    Off,
    Lit(Color),
}

impl LedState {
    pub fn command(self, led: Led) -> Command {
        match self {
            LedState::Off => Command::clear(led),
            LedState::Lit(color) => Command::set(led, color),
        }
    }
}

#[derive(Debug)]
enum Request {
    Raw(Command),
    Steady { led: Led, state: LedState },
    Flash { led: Led, color: Color, duration: Duration },
    Hold(Led),
    Release(Led),
    RestoreDue { led: Led, generation: u64 },
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle producers use to reach the multiplexer.
///
/// Requests from one handle arrive in the order they were made. Once the
/// multiplexer has stopped, requests are dropped with a debug log.
#[derive(Debug, Clone)]
pub struct Feedback {
    requests: mpsc::Sender<Request>,
}

impl Feedback {
    /// Forward a command untouched.
    pub async fn send(&self, cmd: Command) {
        self.request(Request::Raw(cmd)).await;
    }

    /// Record what `led` should normally show and show it unless suppressed.
    pub async fn steady(&self, led: Led, state: LedState) {
        self.request(Request::Steady { led, state }).await;
    }

    /// Show `color` on `led` for `duration`, then whatever its steady state is
    /// at that moment.
    pub async fn flash(&self, led: Led, color: Color, duration: Duration) {
        self.request(Request::Flash {
            led,
            color,
            duration,
        })
        .await;
    }

    /// Keep steady updates off `led` until [`Feedback::release`].
    pub async fn hold(&self, led: Led) {
        self.request(Request::Hold(led)).await;
    }

    /// Drop the hold on `led` and show its steady state again.
    pub async fn release(&self, led: Led) {
        self.request(Request::Release(led)).await;
    }

    /// Wait until everything requested so far has been handed to the transport.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.request(Request::Flush(ack_tx)).await;
        if ack_rx.await.is_err() {
            debug!("Feedback: multiplexer stopped before flush");
        }
    }

    async fn request(&self, request: Request) {
        if let Err(e) = self.requests.send(request).await {
            debug!("Feedback: multiplexer stopped, dropping {:?}", e.0);
        }
    }
}

#[derive(Debug, Default, Clone)]
struct LedSlot {
    steady: LedState,
    /// Generation of the flash currently on screen
    flash: Option<u64>,
    held: bool,
}

impl LedSlot {
    fn suppressed(&self) -> bool {
        self.flash.is_some() || self.held
    }
}

pub struct Multiplexer {
    requests: mpsc::Receiver<Request>,
    /// Flash restores loop back through the request queue. Weak so the queue
    /// still closes once every `Feedback` handle is gone.
    loopback: mpsc::WeakSender<Request>,
    commands: mpsc::Sender<Command>,
    slots: [LedSlot; Led::COUNT],
    next_generation: u64,
    shutdown: CancellationToken,
}

impl Multiplexer {
    /// Start the multiplexer in front of the transport's command queue.
    pub fn spawn(
        commands: mpsc::Sender<Command>,
        shutdown: CancellationToken,
    ) -> (Feedback, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_CAPACITY);
        let mux = Multiplexer {
            requests: rx,
            loopback: tx.downgrade(),
            commands,
            slots: Default::default(),
            next_generation: 0,
            shutdown,
        };
        let task = tokio::spawn(mux.run());
        (Feedback { requests: tx }, task)
    }

    async fn run(mut self) {
        loop {
            let request = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            if !self.process(request).await {
                warn!("Feedback: transport gone, stopping");
                break;
            }
        }
        info!("Feedback multiplexer stopped");
    }

    /// Returns false once the transport queue is closed.
    async fn process(&mut self, request: Request) -> bool {
        match request {
            Request::Raw(cmd) => self.forward(cmd).await,
            Request::Steady { led, state } => {
                let slot = &mut self.slots[led.index()];
                slot.steady = state;
                if slot.suppressed() {
                    debug!("{:?} suppressed, deferring {:?}", led, state);
                    true
                } else {
                    self.forward(state.command(led)).await
                }
            }
            Request::Flash {
                led,
                color,
                duration,
            } => {
                self.next_generation += 1;
                let generation = self.next_generation;
                self.slots[led.index()].flash = Some(generation);
                self.schedule_restore(led, generation, duration);
                self.forward(Command::set(led, color)).await
            }
            Request::Hold(led) => {
                self.slots[led.index()].held = true;
                true
            }
            Request::Release(led) => {
                let slot = &mut self.slots[led.index()];
                slot.held = false;
                if slot.flash.is_some() {
                    return true;
                }
                let steady = slot.steady;
                self.forward(steady.command(led)).await
            }
            Request::RestoreDue { led, generation } => {
                let slot = &mut self.slots[led.index()];
                if slot.flash != Some(generation) {
                    debug!("{:?}: superseded flash restore", led);
                    return true;
                }
                slot.flash = None;
                let steady = slot.steady;
                self.forward(steady.command(led)).await
            }
            Request::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("Feedback: flush requester went away");
                }
                true
            }
        }
    }

    fn schedule_restore(&self, led: Led, generation: u64, duration: Duration) {
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let Some(tx) = loopback.upgrade() else {
                return;
            };
            if tx
                .send(Request::RestoreDue { led, generation })
                .await
                .is_err()
            {
                debug!("Feedback: multiplexer stopped before restore of {:?}", led);
            }
        });
    }

    async fn forward(&self, cmd: Command) -> bool {
        self.commands.send(cmd).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Feedback, mpsc::Receiver<Command>, CancellationToken) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let (feedback, _task) = Multiplexer::spawn(commands_tx, shutdown.clone());
        (feedback, commands_rx, shutdown)
    }

    fn drain(rx: &mut mpsc::Receiver<Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn steady_forwards_when_not_suppressed() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback.steady(Led::Knob, LedState::Lit(Color::GREEN)).await;
        feedback.steady(Led::Knob, LedState::Off).await;
        feedback.flush().await;
        assert_eq!(
            drain(&mut rx),
            vec![
                Command::set(Led::Knob, Color::GREEN),
                Command::clear(Led::Knob)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restore_shows_state_current_at_fire_time() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback.steady(Led::Knob, LedState::Lit(Color::GREEN)).await;
        feedback
            .flash(Led::Knob, Color::RED, Duration::from_millis(150))
            .await;
        feedback.steady(Led::Knob, LedState::Lit(Color::YELLOW)).await;
        feedback.flush().await;
        assert_eq!(
            drain(&mut rx),
            vec![
                Command::set(Led::Knob, Color::GREEN),
                Command::set(Led::Knob, Color::RED)
            ]
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::set(Led::Knob, Color::YELLOW)]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_flash_supersedes_older_restore() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback
            .flash(Led::Knob, Color::RED, Duration::from_millis(150))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        feedback
            .flash(Led::Knob, Color::YELLOW, Duration::from_millis(150))
            .await;

        // First restore due at 150ms is stale
        tokio::time::sleep(Duration::from_millis(100)).await;
        feedback.flush().await;
        assert_eq!(
            drain(&mut rx),
            vec![
                Command::set(Led::Knob, Color::RED),
                Command::set(Led::Knob, Color::YELLOW)
            ]
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::clear(Led::Knob)]);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_defers_steady_until_release() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback.hold(Led::Knob).await;
        feedback.steady(Led::Knob, LedState::Lit(Color::GREEN)).await;
        feedback.flush().await;
        assert!(drain(&mut rx).is_empty());

        feedback.release(Led::Knob).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::set(Led::Knob, Color::GREEN)]);
    }

    #[tokio::test(start_paused = true)]
    async fn release_during_flash_waits_for_restore() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback.hold(Led::Knob).await;
        feedback
            .flash(Led::Knob, Color::RED, Duration::from_millis(150))
            .await;
        feedback.release(Led::Knob).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::set(Led::Knob, Color::RED)]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::clear(Led::Knob)]);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_commands_bypass_suppression() {
        let (feedback, mut rx, _shutdown) = setup();
        feedback.hold(Led::Status1).await;
        feedback.send(Command::toggle(Led::Status1, true)).await;
        feedback.flush().await;
        assert_eq!(drain(&mut rx), vec![Command::toggle(Led::Status1, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let (commands_tx, _commands_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let (feedback, task) = Multiplexer::spawn(commands_tx, shutdown.clone());
        shutdown.cancel();
        task.await.unwrap();

        // Requests after shutdown are dropped, not stuck
        feedback.send(Command::Reset).await;
        feedback.flush().await;
    }
}
