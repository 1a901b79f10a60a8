//! foobar2000 control through the beefweb HTTP API.
//!
//! State arrives over the `/api/query/updates` event stream; commands are
//! short POSTs with a tight timeout so a hung player never backs up the
//! controller.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::http::{self, Endpoint};
use super::sse;
use crate::config::HttpEndpoint;
use crate::subscription::{StateSource, StateStream};

pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Player unreachable; never reported by beefweb itself
    #[serde(skip)]
    Offline,
}

/// Volume in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct VolumeInfo {
    pub min: f64,
    pub max: f64,
    #[serde(rename = "value")]
    pub current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct PlayerInfo {
    #[serde(rename = "playbackState")]
    pub state: PlaybackState,
    #[serde(default)]
    pub volume: VolumeInfo,
}

impl PlayerInfo {
    /// Offline marker that keeps the last known volume range.
    pub fn offline(last: Option<&PlayerInfo>) -> PlayerInfo {
        PlayerInfo {
            state: PlaybackState::Offline,
            volume: last.map(|p| p.volume).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlayerEnvelope {
    player: Option<PlayerInfo>,
}

/// Parse one update event. Events without player data (other query parts,
/// keepalives) yield `None`.
pub fn decode_player_event(data: &str) -> Option<PlayerInfo> {
    if data.is_empty() || data == "{}" {
        return None;
    }
    match serde_json::from_str::<PlayerEnvelope>(data) {
        Ok(envelope) => envelope.player,
        Err(e) => {
            warn!("foobar: could not parse event: {}", e);
            None
        }
    }
}

/// Knob steps are scaled so the quiet end of the range moves faster.
pub fn scaled_volume(volume: &VolumeInfo, delta: i32) -> f64 {
    let mut delta = f64::from(delta);
    if volume.current < -50.0 {
        delta *= 10.0;
    } else if volume.current < -20.0 {
        delta *= 5.0;
    } else if volume.current < -15.0 {
        delta *= 3.0;
    } else if volume.current > -10.0 {
        delta /= 2.0;
    }
    (volume.current + delta).min(volume.max).max(volume.min)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeChange {
    pub volume: f64,
    pub at_min: bool,
    pub at_max: bool,
}

pub struct FoobarClient {
    client: Client,
    endpoint: Endpoint,
}

impl FoobarClient {
    pub fn new(config: &HttpEndpoint) -> Result<Self> {
        Ok(Self {
            client: http::request_client(REQUEST_TIMEOUT)?,
            endpoint: Endpoint::from_config(config)?,
        })
    }

    async fn request(&self, method: Method, path: &str, payload: Option<Value>) -> Result<String> {
        let mut request = self.endpoint.request(&self.client, method, path);
        if let Some(payload) = &payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("foobar request timed out")
            } else {
                anyhow!("foobar request failed: {}", e)
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("could not read foobar response: {}", e))?;
        if !status.is_success() {
            return Err(anyhow!("foobar request returned status {}: {}", status, body));
        }
        Ok(body)
    }

    async fn post(&self, path: &str) -> Result<()> {
        debug!("foobar: POST {}", path);
        self.request(Method::POST, path, None).await.map(|_| ())
    }

    /// Current player state.
    pub async fn player(&self) -> Result<PlayerInfo> {
        let body = self.request(Method::GET, "/api/player", None).await?;
        let envelope: PlayerEnvelope = serde_json::from_str(&body)
            .map_err(|e| anyhow!("could not parse foobar json: {}", e))?;
        envelope
            .player
            .ok_or_else(|| anyhow!("foobar response has no player data"))
    }

    /// Start playback when stopped, otherwise toggle pause.
    pub async fn toggle_pause(&self, current: &PlayerInfo) -> Result<()> {
        if current.state == PlaybackState::Stopped {
            self.post("/api/player/play").await
        } else {
            self.post("/api/player/pause/toggle").await
        }
    }

    pub async fn next(&self) -> Result<()> {
        self.post("/api/player/next").await
    }

    pub async fn previous(&self) -> Result<()> {
        self.post("/api/player/previous").await
    }

    pub async fn stop(&self) -> Result<()> {
        self.post("/api/player/stop").await
    }

    pub async fn adjust_volume(&self, current: &PlayerInfo, delta: i32) -> Result<VolumeChange> {
        let volume = scaled_volume(&current.volume, delta);
        self.request(Method::POST, "/api/player", Some(json!({ "volume": volume })))
            .await?;
        Ok(VolumeChange {
            volume,
            at_min: volume == current.volume.min,
            at_max: volume == current.volume.max,
        })
    }

    /// Seek relative to the current position, in seconds.
    pub async fn seek(&self, delta: i32) -> Result<()> {
        self.request(
            Method::POST,
            "/api/player",
            Some(json!({ "relativePosition": delta })),
        )
        .await
        .map(|_| ())
    }
}

/// Player state feed for a [`crate::subscription::Subscription`].
pub struct FoobarSource {
    client: std::sync::Arc<FoobarClient>,
    stream_client: Client,
    endpoint: Endpoint,
}

impl FoobarSource {
    pub fn new(config: &HttpEndpoint, client: std::sync::Arc<FoobarClient>) -> Result<Self> {
        Ok(Self {
            client,
            stream_client: http::stream_client()?,
            endpoint: Endpoint::from_config(config)?,
        })
    }
}

#[async_trait]
impl StateSource for FoobarSource {
    type State = PlayerInfo;

    fn name(&self) -> &'static str {
        "foobar"
    }

    async fn connect(&self) -> Result<StateStream<PlayerInfo>> {
        let events = sse::subscribe(
            &self.stream_client,
            &self.endpoint,
            "/api/query/updates?player=true",
        )
        .await?;
        Ok(events
            .try_filter_map(|data| future::ready(Ok(decode_player_event(&data))))
            .boxed())
    }

    async fn snapshot(&self) -> Result<Option<PlayerInfo>> {
        self.client.player().await.map(Some)
    }

    fn offline_state(&self, last: Option<&PlayerInfo>) -> Option<PlayerInfo> {
        Some(PlayerInfo::offline(last))
    }
}
