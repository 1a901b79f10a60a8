//! Subscription - turns a flaky [`StateSource`] into a channel of distinct states
//!
//! Every tracker goes through here. Reconnects, exponential backoff and
//! de-duplication live in one place; sources should NOT implement their own
//! retry loops.

mod traits;

pub use traits::{StateSource, StateStream};

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the channel handed to the consumer.
pub const SUBSCRIPTION_CAPACITY: usize = 16;

/// Reconnect timing
#[derive(Debug, Clone)]
struct RetryConfig {
    /// First delay after a live stream drops
    initial_delay: Duration,
    /// Backoff caps at this value
    max_delay: Duration,
    /// Fixed wait after a failed initial connect
    resubscribe_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            resubscribe_delay: Duration::from_secs(1),
        }
    }
}

/// Remembers the last emitted value and lets through only changes.
#[derive(Debug, Default)]
pub struct Dedup<S> {
    last: Option<S>,
}

impl<S: Clone + PartialEq> Dedup<S> {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// `Some(state)` if it differs from the last accepted value.
    pub fn accept(&mut self, state: S) -> Option<S> {
        if self.last.as_ref() == Some(&state) {
            return None;
        }
        self.last = Some(state.clone());
        Some(state)
    }

    pub fn last(&self) -> Option<&S> {
        self.last.as_ref()
    }
}

/// Runs a [`StateSource`] until shutdown, forwarding distinct states.
pub struct Subscription<T: StateSource> {
    source: Arc<T>,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl<T: StateSource> Subscription<T> {
    pub fn new(source: T, shutdown: CancellationToken) -> Self {
        Self {
            source: Arc::new(source),
            retry: RetryConfig::default(),
            shutdown,
        }
    }

    /// Spawn the subscription and return its receiving end.
    ///
    /// The channel closes when shutdown is cancelled.
    pub fn spawn(self) -> (mpsc::Receiver<T::State>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let task = tokio::spawn(self.run(tx));
        (rx, task)
    }

    /// Drive the source until shutdown or until the receiver goes away.
    pub async fn run(self, tx: mpsc::Sender<T::State>) {
        let name = self.source.name();
        let mut dedup = Dedup::new();

        // Initial subscribe: fixed delay between attempts
        let mut stream = loop {
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return self.stopped(),
                attempt = self.source.connect() => attempt,
            };
            match attempt {
                Ok(stream) => break stream,
                Err(e) => {
                    warn!(
                        "{}: subscribe failed ({}), retrying in {:?}",
                        name, e, self.retry.resubscribe_delay
                    );
                    if !self.announce_offline(&mut dedup, &tx).await
                        || !self.pause(self.retry.resubscribe_delay).await
                    {
                        return self.stopped();
                    }
                }
            }
        };
        info!("{}: subscribed", name);
        if !self.refresh_snapshot(&mut dedup, &tx).await {
            return self.stopped();
        }

        let mut delay = self.retry.initial_delay;
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(Ok(state)) => {
                    delay = self.retry.initial_delay;
                    if !self.emit(&mut dedup, &tx, state).await {
                        break;
                    }
                    continue;
                }
                Some(Err(e)) => warn!("{}: stream error: {}", name, e),
                None => warn!("{}: stream ended", name),
            }

            if !self.announce_offline(&mut dedup, &tx).await {
                break;
            }

            // Reconnect with exponential backoff
            stream = loop {
                debug!("{}: reconnecting in {:?}", name, delay);
                if !self.pause(delay).await {
                    return self.stopped();
                }
                delay = (delay * 2).min(self.retry.max_delay);

                let attempt = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return self.stopped(),
                    attempt = self.source.connect() => attempt,
                };
                match attempt {
                    Ok(stream) => break stream,
                    Err(e) => warn!("{}: reconnect failed: {}", name, e),
                }
            };
            info!("{}: reconnected", name);
            delay = self.retry.initial_delay;
            if !self.refresh_snapshot(&mut dedup, &tx).await {
                break;
            }
        }

        self.stopped()
    }

    /// Push the source's current snapshot, if it has one. Returns false once
    /// the consumer is gone.
    async fn refresh_snapshot(&self, dedup: &mut Dedup<T::State>, tx: &mpsc::Sender<T::State>) -> bool {
        let snapshot = tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            snapshot = self.source.snapshot() => snapshot,
        };
        match snapshot {
            Ok(Some(state)) => self.emit(dedup, tx, state).await,
            Ok(None) => true,
            Err(e) => {
                warn!("{}: could not fetch initial state: {}", self.source.name(), e);
                true
            }
        }
    }

    async fn announce_offline(&self, dedup: &mut Dedup<T::State>, tx: &mpsc::Sender<T::State>) -> bool {
        match self.source.offline_state(dedup.last()) {
            Some(offline) => self.emit(dedup, tx, offline).await,
            None => true,
        }
    }

    async fn emit(&self, dedup: &mut Dedup<T::State>, tx: &mpsc::Sender<T::State>, state: T::State) -> bool {
        let Some(state) = dedup.accept(state) else {
            return true;
        };
        debug!("{}: state {:?}", self.source.name(), state);
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            sent = tx.send(state) => sent.is_ok(),
        }
    }

    /// Sleep unless shutdown comes first. Returns false on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn stopped(&self) {
        info!("{}: subscription stopped", self.source.name());
    }
}
