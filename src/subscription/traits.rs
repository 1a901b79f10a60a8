use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::Debug;

/// A live stream of states from a remote source. An `Err` item or the end of
/// the stream counts as a disconnect.
pub type StateStream<S> = BoxStream<'static, Result<S>>;

// =============================================================================
// StateSource - what a tracker plugs into a Subscription
// =============================================================================

/// A flaky remote that can be (re)connected to and yields whole snapshots.
///
/// Implementations only know how to talk to their remote; reconnects,
/// backoff and de-duplication are handled by [`super::Subscription`].
#[async_trait]
pub trait StateSource: Send + Sync + 'static {
    type State: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Short name for log lines (e.g. "foobar", "nothub")
    fn name(&self) -> &'static str;

    /// Open a live stream of states.
    async fn connect(&self) -> Result<StateStream<Self::State>>;

    /// Fetch the current state right after connecting.
    /// Default: none, the stream alone defines the state.
    async fn snapshot(&self) -> Result<Option<Self::State>> {
        Ok(None)
    }

    /// Sentinel announced while disconnected, derived from the last emitted
    /// state. Default: none, consumers keep the last state.
    fn offline_state(&self, _last: Option<&Self::State>) -> Option<Self::State> {
        None
    }
}
