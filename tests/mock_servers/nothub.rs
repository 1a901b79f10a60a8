//! Mock NotHub for testing
//!
//! Serves the `/updates` event stream; every connection starts with the
//! current flags.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use futures::{future, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Debug, Clone, Copy, Default)]
pub struct HubFlags {
    pub chan_hl: bool,
    pub chan_msg: bool,
    pub commit: bool,
    pub priv_msg: bool,
}

impl HubFlags {
    fn event(&self) -> String {
        json!({
            "ChanHL": self.chan_hl,
            "ChanMsg": self.chan_msg,
            "Commit": self.commit,
            "PrivMsg": self.priv_msg,
        })
        .to_string()
    }
}

struct Shared {
    flags: RwLock<HubFlags>,
    updates: broadcast::Sender<String>,
}

/// Mock NotHub server
pub struct MockNotHub {
    addr: SocketAddr,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockNotHub {
    pub async fn start() -> Self {
        let (updates, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            flags: RwLock::new(HubFlags::default()),
            updates,
        });

        let app = Router::new()
            .route("/updates", get(updates_stream))
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

    pub async fn publish(&self, flags: HubFlags) {
        *self.shared.flags.write().await = flags;
        if self.shared.updates.send(flags.event()).is_err() {
            // No stream open; the next connection starts with these flags
        }
    }

    pub async fn stop(self) {
        self.handle.abort();
    }
}

async fn updates_stream(
    State(shared): State<Arc<Shared>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = shared.updates.subscribe();
    let initial = shared.flags.read().await.event();

    let live = BroadcastStream::new(rx).filter_map(|msg| future::ready(msg.ok()));
    let events = stream::once(future::ready(initial))
        .chain(live)
        .map(|data| Ok(Event::default().data(data)));
    Sse::new(events)
}
