//! LED arbitration between trackers, flashes, held gestures and blinkers,
//! observed at the transport's command queue.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rotaryboard::feedback::blink::{BlinkPattern, Blinker, BLINK_INTERVAL};
use rotaryboard::feedback::{Feedback, LedState, Multiplexer};
use rotaryboard::protocol::{Color, Command, Led};

fn setup() -> (Feedback, mpsc::Receiver<Command>, CancellationToken) {
    let (commands_tx, commands_rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();
    let (feedback, _task) = Multiplexer::spawn(commands_tx, shutdown.clone());
    (feedback, commands_rx, shutdown)
}

async fn sent_until(
    feedback: &Feedback,
    rx: &mut mpsc::Receiver<Command>,
    after: Duration,
) -> Vec<Command> {
    tokio::time::sleep(after).await;
    feedback.flush().await;
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn flash_outlives_steady_update() {
    let (feedback, mut rx, _shutdown) = setup();
    feedback.steady(Led::Knob, LedState::Lit(Color::YELLOW)).await;
    feedback
        .flash(Led::Knob, Color::RED, Duration::from_millis(150))
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    feedback.steady(Led::Knob, LedState::Lit(Color::GREEN)).await;

    // Still red: the update is recorded, not shown
    assert_eq!(
        sent_until(&feedback, &mut rx, Duration::from_millis(50)).await,
        vec![
            Command::set(Led::Knob, Color::YELLOW),
            Command::set(Led::Knob, Color::RED),
        ]
    );
    // The flash's own restore shows the newest steady state
    assert_eq!(
        sent_until(&feedback, &mut rx, Duration::from_millis(100)).await,
        vec![Command::set(Led::Knob, Color::GREEN)]
    );
}

#[tokio::test(start_paused = true)]
async fn seek_hold_outlasts_flash() {
    let (feedback, mut rx, _shutdown) = setup();
    feedback.steady(Led::Knob, LedState::Lit(Color::GREEN)).await;
    feedback.hold(Led::Knob).await;
    feedback
        .flash(Led::Knob, Color::RED, Duration::from_millis(150))
        .await;
    feedback.steady(Led::Knob, LedState::Lit(Color::YELLOW)).await;

    assert_eq!(
        sent_until(&feedback, &mut rx, Duration::from_millis(10)).await,
        vec![
            Command::set(Led::Knob, Color::GREEN),
            Command::set(Led::Knob, Color::RED),
        ]
    );

    // Restore fires while still held: steady comes back, the hold only
    // keeps further tracker updates off
    assert_eq!(
        sent_until(&feedback, &mut rx, Duration::from_millis(200)).await,
        vec![Command::set(Led::Knob, Color::YELLOW)]
    );

    feedback.steady(Led::Knob, LedState::Off).await;
    assert!(sent_until(&feedback, &mut rx, Duration::from_millis(10))
        .await
        .is_empty());

    feedback.release(Led::Knob).await;
    assert_eq!(
        sent_until(&feedback, &mut rx, Duration::from_millis(10)).await,
        vec![Command::clear(Led::Knob)]
    );
}

fn is_knob(cmd: &Command) -> bool {
    matches!(
        cmd,
        Command::SetLed {
            target: Led::Knob,
            ..
        } | Command::ClearLed { target: Led::Knob }
    )
}

struct Commit(bool);

impl BlinkPattern for Commit {
    fn render(&self, phase: bool) -> Vec<(Led, bool)> {
        vec![(Led::Status1, self.0 && phase)]
    }
}

#[tokio::test(start_paused = true)]
async fn blinker_and_knob_do_not_interfere() {
    let (feedback, mut rx, shutdown) = setup();
    let blinker = Blinker::spawn(Commit(true), feedback.clone(), shutdown.clone());
    feedback
        .flash(Led::Knob, Color::RED, Duration::from_millis(150))
        .await;

    let sent = sent_until(&feedback, &mut rx, BLINK_INTERVAL * 3 + BLINK_INTERVAL / 2).await;
    let (knob, status): (Vec<Command>, Vec<Command>) = sent.into_iter().partition(is_knob);

    assert_eq!(
        status,
        vec![
            Command::toggle(Led::Status1, true),
            Command::clear(Led::Status1),
            Command::toggle(Led::Status1, true),
            Command::clear(Led::Status1),
        ]
    );
    assert_eq!(
        knob,
        vec![Command::set(Led::Knob, Color::RED), Command::clear(Led::Knob)]
    );

    shutdown.cancel();
    blinker.join().await;
}
