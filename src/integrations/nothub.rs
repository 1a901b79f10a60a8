//! NotHub notification hub, read from its `/updates` event stream.

use anyhow::Result;
use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::http::{self, Endpoint};
use super::notifications::NotificationFlags;
use super::sse;
use crate::config::HttpEndpoint;
use crate::subscription::{StateSource, StateStream};

/// Wire format of one NotHub update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NotHubState {
    #[serde(rename = "ChanHL", default)]
    pub channel_highlight: bool,
    #[serde(rename = "ChanMsg", default)]
    pub channel_message: bool,
    #[serde(rename = "Commit", default)]
    pub commit: bool,
    #[serde(rename = "PrivMsg", default)]
    pub private_message: bool,
}

impl From<NotHubState> for NotificationFlags {
    fn from(state: NotHubState) -> Self {
        NotificationFlags {
            channel_highlight: state.channel_highlight,
            channel_message: state.channel_message,
            private_message: state.private_message,
            commit: state.commit,
        }
    }
}

fn decode(data: &str) -> Option<NotificationFlags> {
    match serde_json::from_str::<NotHubState>(data) {
        Ok(state) => Some(state.into()),
        Err(e) => {
            warn!("nothub: could not parse event: {}", e);
            None
        }
    }
}

pub struct NotHubSource {
    client: Client,
    endpoint: Endpoint,
}

impl NotHubSource {
    pub fn new(config: &HttpEndpoint) -> Result<Self> {
        Ok(Self {
            client: http::stream_client()?,
            endpoint: Endpoint::from_config(config)?,
        })
    }
}

#[async_trait]
impl StateSource for NotHubSource {
    type State = NotificationFlags;

    fn name(&self) -> &'static str {
        "nothub"
    }

    async fn connect(&self) -> Result<StateStream<NotificationFlags>> {
        let events = sse::subscribe(&self.client, &self.endpoint, "/updates").await?;
        Ok(events
            .try_filter_map(|data| future::ready(Ok(decode(&data))))
            .boxed())
    }

    /// Nothing is pending while the hub is unreachable.
    fn offline_state(&self, _last: Option<&NotificationFlags>) -> Option<NotificationFlags> {
        Some(NotificationFlags::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hub_updates() {
        let flags = decode(r#"{"ChanHL":true,"ChanMsg":true,"Commit":false,"PrivMsg":false}"#)
            .expect("valid update");
        assert!(flags.channel_highlight);
        assert!(flags.channel_message);
        assert!(!flags.commit);
        assert!(!flags.private_message);
    }

    #[test]
    fn missing_fields_default_to_false() {
        assert_eq!(decode(r#"{"Commit":true}"#).map(|f| f.commit), Some(true));
        assert_eq!(decode("garbage"), None);
    }
}
