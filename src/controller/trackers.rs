//! Trackers turn subscription output into LED state.
//!
//! The player tracker drives the knob LED; NotHub and the IRC file share one
//! [`Blinker`] on the status row. The session lock state lights the top-left
//! button and keeps monitors in standby while locked.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feedback::blink::Blinker;
use crate::feedback::{Feedback, LedState};
use crate::integrations::desktop::{DesktopActions, MONITOR_GUARD_INTERVAL};
use crate::integrations::foobar::{PlaybackState, PlayerInfo};
use crate::integrations::notifications::{NotificationBoard, NotificationFlags};
use crate::integrations::TrackerSources;
use crate::protocol::{Button, Color, Led};
use crate::subscription::Subscription;

/// How long the knob flashes red when the player goes away
pub const OFFLINE_FLASH: Duration = Duration::from_secs(1);

pub fn knob_led(state: PlaybackState) -> LedState {
    match state {
        PlaybackState::Playing => LedState::Lit(Color::GREEN),
        PlaybackState::Paused => LedState::Lit(Color::YELLOW),
        PlaybackState::Stopped | PlaybackState::Offline => LedState::Off,
    }
}

/// Start every configured tracker on `session`.
pub fn start(
    sources: TrackerSources,
    feedback: Feedback,
    player_state: Arc<RwLock<PlayerInfo>>,
    desktop: Arc<DesktopActions>,
    session: CancellationToken,
) {
    if let Some(source) = sources.lock {
        let (rx, _task) = Subscription::new(source, session.clone()).spawn();
        tokio::spawn(track_lock(
            rx,
            desktop.clone(),
            feedback.clone(),
            session.clone(),
        ));
        tokio::spawn(keep_monitors_off(
            desktop,
            MONITOR_GUARD_INTERVAL,
            session.clone(),
        ));
    }

    if let Some(source) = sources.foobar {
        let (rx, _task) = Subscription::new(source, session.clone()).spawn();
        tokio::spawn(track_player(
            rx,
            player_state,
            feedback.clone(),
            session.clone(),
        ));
    }

    if sources.nothub.is_none() && sources.irc.is_none() {
        return;
    }
    let blinker = Arc::new(Blinker::spawn(
        NotificationBoard::default(),
        feedback,
        session.clone(),
    ));

    if let Some(source) = sources.nothub {
        let (rx, _task) = Subscription::new(source, session.clone()).spawn();
        tokio::spawn(track_notifications(
            rx,
            blinker.clone(),
            |board, flags| board.nothub = flags,
            "nothub",
            session.clone(),
        ));
    }
    if let Some(source) = sources.irc {
        let (rx, _task) = Subscription::new(source, session.clone()).spawn();
        tokio::spawn(track_notifications(
            rx,
            blinker,
            |board, flags| board.irc = flags,
            "irc",
            session,
        ));
    }
}

/// Mirror player state on the knob LED and keep `snapshot` current for the
/// actions that need it.
pub async fn track_player(
    mut updates: mpsc::Receiver<PlayerInfo>,
    snapshot: Arc<RwLock<PlayerInfo>>,
    feedback: Feedback,
    shutdown: CancellationToken,
) {
    loop {
        let info = tokio::select! {
            _ = shutdown.cancelled() => break,
            info = updates.recv() => match info {
                Some(info) => info,
                None => break,
            },
        };
        debug!("foobar: {:?}", info);
        *snapshot.write().await = info;

        if info.state == PlaybackState::Offline {
            info!("foobar offline");
            feedback.flash(Led::Knob, Color::RED, OFFLINE_FLASH).await;
        }
        feedback.steady(Led::Knob, knob_led(info.state)).await;
    }
}

/// Copy each update into the shared notification board.
pub async fn track_notifications(
    mut updates: mpsc::Receiver<NotificationFlags>,
    blinker: Arc<Blinker<NotificationBoard>>,
    apply: fn(&mut NotificationBoard, NotificationFlags),
    name: &'static str,
    shutdown: CancellationToken,
) {
    loop {
        let flags = tokio::select! {
            _ = shutdown.cancelled() => break,
            flags = updates.recv() => match flags {
                Some(flags) => flags,
                None => break,
            },
        };
        debug!("{}: {:?}", name, flags);
        blinker.update(|board| apply(board, flags)).await;
    }
}

/// Light the top-left button while the session is locked.
pub async fn track_lock(
    mut updates: mpsc::Receiver<bool>,
    desktop: Arc<DesktopActions>,
    feedback: Feedback,
    shutdown: CancellationToken,
) {
    let led = Button::TopLeft.led();
    loop {
        let locked = tokio::select! {
            _ = shutdown.cancelled() => break,
            locked = updates.recv() => match locked {
                Some(locked) => locked,
                None => break,
            },
        };
        info!("Session {}", if locked { "locked" } else { "unlocked" });
        desktop.set_locked(locked).await;
        let state = if locked {
            LedState::Lit(Color::ON)
        } else {
            LedState::Off
        };
        feedback.steady(led, state).await;
    }
}

/// Periodically push monitors back into standby while locked.
pub async fn keep_monitors_off(
    desktop: Arc<DesktopActions>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = desktop.keep_monitors_off().await {
                    warn!("Could not keep monitors off: {:#}", e);
                }
            }
        }
    }
}
