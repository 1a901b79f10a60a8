//! IRC notification counters, polled from a small text file.
//!
//! The file holds three integers on three lines: channel state (1 = activity,
//! 2 = highlight), private messages and commits. Unparseable lines count as 0.

use anyhow::Result;
use async_trait::async_trait;
use futures::{future, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::warn;

use super::notifications::NotificationFlags;
use crate::subscription::{StateSource, StateStream};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

const CHANNEL_HIGHLIGHT: i64 = 2;

pub fn parse_counters(contents: &str) -> NotificationFlags {
    let mut counters = [0i64; 3];
    for (slot, line) in counters.iter_mut().zip(contents.lines()) {
        *slot = line.trim().parse().unwrap_or(0);
    }
    let [channel, private, commit] = counters;
    NotificationFlags {
        channel_highlight: channel == CHANNEL_HIGHLIGHT,
        channel_message: channel != 0,
        private_message: private != 0,
        commit: commit != 0,
    }
}

async fn read_counters(path: &Path) -> Option<NotificationFlags> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(parse_counters(&contents)),
        Err(e) => {
            warn!("irc: could not read {}: {}", path.display(), e);
            None
        }
    }
}

pub struct IrcFileSource {
    path: PathBuf,
    interval: Duration,
}

impl IrcFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl StateSource for IrcFileSource {
    type State = NotificationFlags;

    fn name(&self) -> &'static str {
        "irc"
    }

    /// Never fails and never ends; an unreadable file just keeps the
    /// previous state.
    async fn connect(&self) -> Result<StateStream<NotificationFlags>> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let path = self.path.clone();
        Ok(IntervalStream::new(ticker)
            .then(move |_| {
                let path = path.clone();
                async move { read_counters(&path).await }
            })
            .filter_map(future::ready)
            .map(Ok)
            .boxed())
    }
}
