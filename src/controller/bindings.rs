//! Which action each gesture triggers.
//!
//! | Gesture                 | Action                              |
//! |-------------------------|-------------------------------------|
//! | knob tap                | play if stopped, else toggle pause  |
//! | knob turn               | volume                              |
//! | knob push + turn        | seek                                |
//! | top-left tap            | lock desktop                        |
//! | bottom-left tap         | next track                          |
//! | bottom-left long press  | previous track                      |
//! | knob push + bottom-left | stop                                |
//! | bottom-right tap        | toggle monitors                     |

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{trackers, IntentHandler};
use crate::feedback::{animation, Feedback};
use crate::gesture::Intent;
use crate::integrations::desktop::DesktopActions;
use crate::integrations::foobar::{FoobarClient, PlayerInfo};
use crate::integrations::{Integrations, TrackerSources};
use crate::protocol::{Button, Color, Led};

/// Knob flash after a failed action or a direction error
pub const ERROR_FLASH: Duration = Duration::from_millis(150);
/// Knob flash when the volume hits either end of its range
pub const LIMIT_FLASH: Duration = Duration::from_millis(150);

pub struct Bindings {
    feedback: Feedback,
    player: Option<Arc<FoobarClient>>,
    player_state: Arc<RwLock<PlayerInfo>>,
    desktop: Arc<DesktopActions>,
    /// Taken on startup
    sources: Mutex<Option<TrackerSources>>,
    session: CancellationToken,
}

impl Bindings {
    pub fn new(integrations: Integrations, feedback: Feedback, session: CancellationToken) -> Self {
        Self {
            feedback,
            player: integrations.player,
            player_state: Arc::new(RwLock::new(PlayerInfo::offline(None))),
            desktop: Arc::new(integrations.desktop),
            sources: Mutex::new(Some(integrations.sources)),
            session,
        }
    }

    /// Last player state seen by the tracker.
    pub fn player_state(&self) -> Arc<RwLock<PlayerInfo>> {
        self.player_state.clone()
    }

    async fn startup(&self) {
        let feedback = self.feedback.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            let intro = animation::intro(animation::FRAME_DELAY);
            tokio::select! {
                _ = session.cancelled() => {}
                _ = animation::play(&feedback, &intro) => {
                    // The intro leaves the knob dark; show the tracked state again
                    feedback.release(Led::Knob).await;
                }
            }
        });

        let sources = self.sources.lock().await.take();
        match sources {
            Some(sources) => trackers::start(
                sources,
                self.feedback.clone(),
                self.player_state.clone(),
                self.desktop.clone(),
                self.session.clone(),
            ),
            None => debug!("Trackers already running"),
        }
    }

    /// Run a player action in the background; failures flash the knob red.
    fn spawn_player<F, Fut>(&self, label: &'static str, action: F)
    where
        F: FnOnce(Arc<FoobarClient>, PlayerInfo) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(player) = self.player.clone() else {
            debug!("No player configured, ignoring {}", label);
            return;
        };
        let player_state = self.player_state.clone();
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            let current = *player_state.read().await;
            if let Err(e) = action(player, current).await {
                warn!("foobar {} failed: {}", label, e);
                feedback.flash(Led::Knob, Color::RED, ERROR_FLASH).await;
            }
        });
    }

    fn adjust_volume(&self, delta: i32) {
        let feedback = self.feedback.clone();
        let player_state = self.player_state.clone();
        self.spawn_player("volume", move |player, current| async move {
            let change = player.adjust_volume(&current, delta).await?;
            debug!("foobar volume {:.1} dB", change.volume);
            player_state.write().await.volume.current = change.volume;
            if change.at_min || change.at_max {
                feedback.flash(Led::Knob, Color::YELLOW, LIMIT_FLASH).await;
            }
            Ok(())
        });
    }

    fn spawn_desktop<F, Fut>(&self, label: &'static str, action: F)
    where
        F: FnOnce(Arc<DesktopActions>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let desktop = self.desktop.clone();
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            if let Err(e) = action(desktop).await {
                warn!("desktop {} failed: {}", label, e);
                feedback.flash(Led::Knob, Color::RED, ERROR_FLASH).await;
            }
        });
    }
}

#[async_trait]
impl IntentHandler for Bindings {
    async fn handle(&self, intent: Intent) {
        match intent {
            Intent::Startup => self.startup().await,
            Intent::KnobTap => self.spawn_player("toggle pause", |player, current| async move {
                player.toggle_pause(&current).await
            }),
            Intent::KnobReleased => self.feedback.release(Led::Knob).await,
            Intent::Rotate { delta } => self.adjust_volume(delta),
            Intent::Seek { delta } => {
                self.feedback.hold(Led::Knob).await;
                self.spawn_player("seek", move |player, _| async move {
                    player.seek(delta).await
                });
            }
            Intent::DirectionError => {
                self.feedback
                    .flash(Led::Knob, Color::RED, ERROR_FLASH)
                    .await
            }
            Intent::ButtonTap(Button::TopLeft) => {
                self.spawn_desktop("lock", |desktop| async move { desktop.lock().await })
            }
            Intent::ButtonTap(Button::BottomLeft) => {
                self.spawn_player("next", |player, _| async move { player.next().await })
            }
            Intent::ButtonTap(Button::BottomRight) => {
                self.spawn_desktop("monitors", |desktop| async move {
                    let on = desktop.toggle_monitors().await?;
                    info!("Monitors {}", if on { "on" } else { "off" });
                    Ok(())
                })
            }
            Intent::LongPress(Button::BottomLeft) => {
                self.spawn_player("previous", |player, _| async move {
                    player.previous().await
                })
            }
            Intent::Combo(Button::BottomLeft) => {
                self.spawn_player("stop", |player, _| async move { player.stop().await })
            }
            other => debug!("No action bound to {:?}", other),
        }
    }
}
