//! External systems the panel controls or reflects.
//!
//! - `foobar`: media player (beefweb HTTP API + event stream)
//! - `nothub`: notification hub event stream
//! - `irc`: notification counters polled from a file
//! - `desktop`: workstation lock, monitor power and lock-state check via
//!   external commands

pub mod desktop;
pub mod foobar;
pub mod http;
pub mod irc;
pub mod notifications;
pub mod nothub;
pub mod sse;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use desktop::{DesktopActions, LockStateSource};
use foobar::{FoobarClient, FoobarSource};
use irc::IrcFileSource;
use nothub::NotHubSource;

/// State feeds started once the panel is ready.
#[derive(Default)]
pub struct TrackerSources {
    pub foobar: Option<FoobarSource>,
    pub nothub: Option<NotHubSource>,
    pub irc: Option<IrcFileSource>,
    pub lock: Option<LockStateSource>,
}

/// Everything built from the integration sections of the config.
pub struct Integrations {
    pub player: Option<Arc<FoobarClient>>,
    pub sources: TrackerSources,
    pub desktop: DesktopActions,
}

impl Integrations {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut sources = TrackerSources::default();

        let player = match &config.foobar {
            Some(endpoint) => {
                let client = Arc::new(FoobarClient::new(endpoint).context("foobar")?);
                sources.foobar =
                    Some(FoobarSource::new(endpoint, client.clone()).context("foobar")?);
                info!("foobar integration enabled ({})", endpoint.url);
                Some(client)
            }
            None => None,
        };

        if let Some(endpoint) = &config.nothub {
            sources.nothub = Some(NotHubSource::new(endpoint).context("nothub")?);
            info!("nothub integration enabled ({})", endpoint.url);
        }

        if let Some(path) = &config.irc {
            sources.irc = Some(IrcFileSource::new(path.clone()));
            info!("irc notifications enabled ({})", path.display());
        }

        if let Some(argv) = &config.desktop.lock_state {
            sources.lock = Some(LockStateSource::new(argv.clone()));
            info!("lock-state tracking enabled ({:?})", argv);
        }

        Ok(Self {
            player,
            sources,
            desktop: DesktopActions::new(config.desktop.clone()),
        })
    }
}
