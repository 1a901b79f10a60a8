//! Mock beefweb (foobar2000 HTTP API) for testing
//!
//! Serves `/api/player`, the `/api/query/updates` event stream and the player
//! command endpoints, recording every command it receives.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use futures::{future, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

/// A command the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub path: String,
    pub body: Option<Value>,
    pub authorized: bool,
}

struct MockPlayer {
    state: String,
    min: f64,
    max: f64,
    volume: f64,
}

struct Inner {
    player: MockPlayer,
    requests: Vec<Recorded>,
    failing: bool,
}

struct Shared {
    inner: RwLock<Inner>,
    /// `None` ends every open event stream
    updates: broadcast::Sender<Option<String>>,
}

/// Mock beefweb server
pub struct MockBeefweb {
    addr: SocketAddr,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockBeefweb {
    /// Start a mock beefweb on a random port, stopped at -20 dB
    pub async fn start() -> Self {
        let (updates, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            inner: RwLock::new(Inner {
                player: MockPlayer {
                    state: "stopped".to_string(),
                    min: -100.0,
                    max: 0.0,
                    volume: -20.0,
                },
                requests: Vec::new(),
                failing: false,
            }),
            updates,
        });

        let app = Router::new()
            .route("/api/player", get(get_player).post(update_player))
            .route("/api/player/play", post(command))
            .route("/api/player/pause/toggle", post(command))
            .route("/api/player/next", post(command))
            .route("/api/player/previous", post(command))
            .route("/api/player/stop", post(command))
            .route("/api/query/updates", get(updates_stream))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            shared,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Change the playback state and push it to every open event stream
    pub async fn set_state(&self, state: &str) {
        let event = {
            let mut inner = self.shared.inner.write().await;
            inner.player.state = state.to_string();
            player_event(&inner.player)
        };
        if self.shared.updates.send(Some(event)).is_err() {
            // No stream open right now; the next one starts with this state
        }
    }

    /// Close every open event stream, as if the player restarted
    pub fn end_streams(&self) {
        if self.shared.updates.send(None).is_err() {
            // Nothing to close
        }
    }

    /// Make command endpoints answer 500
    pub async fn set_failing(&self, failing: bool) {
        self.shared.inner.write().await.failing = failing;
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.shared.inner.read().await.requests.clone()
    }

    /// Wait until a command for `path` arrives
    pub async fn wait_for(&self, path: &str) -> Recorded {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(found) = self.requests().await.into_iter().find(|r| r.path == path) {
                return found;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no request for {} (got {:?})",
                path,
                self.requests().await
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

fn player_json(player: &MockPlayer) -> Value {
    json!({
        "info": { "name": "foobar2000", "version": "2.1" },
        "activeItem": { "playlistId": "p1", "index": 0, "position": 12.5, "duration": 240.0 },
        "playbackState": player.state,
        "volume": {
            "type": "db",
            "min": player.min,
            "max": player.max,
            "value": player.volume,
            "isMuted": false
        }
    })
}

fn player_event(player: &MockPlayer) -> String {
    json!({ "player": player_json(player) }).to_string()
}

async fn record(shared: &Shared, uri: &Uri, headers: &HeaderMap, body: Option<Value>) -> StatusCode {
    let mut inner = shared.inner.write().await;
    inner.requests.push(Recorded {
        path: uri.path().to_string(),
        body,
        authorized: headers.contains_key("authorization"),
    });
    if inner.failing {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn get_player(State(shared): State<Arc<Shared>>) -> Json<Value> {
    let inner = shared.inner.read().await;
    Json(json!({ "player": player_json(&inner.player) }))
}

async fn update_player(
    State(shared): State<Arc<Shared>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if let Some(volume) = body.get("volume").and_then(Value::as_f64) {
        shared.inner.write().await.player.volume = volume;
    }
    record(&shared, &uri, &headers, Some(body)).await
}

async fn command(State(shared): State<Arc<Shared>>, uri: Uri, headers: HeaderMap) -> StatusCode {
    record(&shared, &uri, &headers, None).await
}

async fn updates_stream(
    State(shared): State<Arc<Shared>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = shared.updates.subscribe();
    let initial = {
        let inner = shared.inner.read().await;
        player_event(&inner.player)
    };

    let live = BroadcastStream::new(rx)
        .filter_map(|msg| future::ready(msg.ok()))
        .take_while(|msg| future::ready(msg.is_some()))
        .filter_map(future::ready);
    let events = stream::once(future::ready(initial))
        .chain(live)
        .map(|data| Ok(Event::default().data(data)));
    Sse::new(events)
}
