//! Desktop actions (lock, monitor power) run as configured external commands,
//! plus an optional lock-state check polled the same way.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{future, StreamExt};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

use crate::config::DesktopConfig;
use crate::subscription::{StateSource, StateStream};

/// How often the lock-state command runs.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often monitors are pushed back into standby while locked.
pub const MONITOR_GUARD_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct DesktopState {
    monitors_on: bool,
    locked: bool,
}

pub struct DesktopActions {
    config: DesktopConfig,
    /// Held for the whole of a monitor command so toggles run one at a time.
    state: Mutex<DesktopState>,
}

impl DesktopActions {
    pub fn new(config: DesktopConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DesktopState {
                monitors_on: true,
                locked: false,
            }),
        }
    }

    pub async fn lock(&self) -> Result<()> {
        info!("Locking desktop");
        run("lock", self.config.lock.as_deref()).await
    }

    /// Switch monitors off if they are on and vice versa. Returns the new
    /// power state; it only flips when the command succeeded.
    pub async fn toggle_monitors(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let turn_on = !state.monitors_on;
        if turn_on {
            info!("Turning monitors on");
            run("monitors_on", self.config.monitors_on.as_deref()).await?;
        } else {
            info!("Turning monitors off");
            run("monitors_off", self.config.monitors_off.as_deref()).await?;
        }
        state.monitors_on = turn_on;
        Ok(turn_on)
    }

    /// Record the session lock state reported by the lock-state command.
    pub async fn set_locked(&self, locked: bool) {
        self.state.lock().await.locked = locked;
    }

    /// Monitors switched off from the panel sometimes wake up on their own
    /// while the session is locked. Send them back to standby; returns
    /// whether a command ran.
    pub async fn keep_monitors_off(&self) -> Result<bool> {
        let state = self.state.lock().await;
        if state.monitors_on || !state.locked {
            return Ok(false);
        }
        debug!("Session locked with monitors off, re-sending standby");
        run("monitors_off", self.config.monitors_off.as_deref()).await?;
        Ok(true)
    }
}

async fn run(action: &str, argv: Option<&[String]>) -> Result<()> {
    let Some((program, args)) = argv.and_then(|argv| argv.split_first()) else {
        debug!("desktop: no command configured for {}", action);
        return Ok(());
    };

    let status = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("could not run {} command {:?}", action, program))?;

    if !status.success() {
        return Err(anyhow!("{} command {:?} exited with {}", action, program, status));
    }
    Ok(())
}

/// Run the lock-state command: exit status 0 means locked. `None` when it
/// could not be started.
async fn query_locked(argv: &[String]) -> Option<bool> {
    let (program, args) = argv.split_first()?;
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
    {
        Ok(status) => Some(status.success()),
        Err(e) => {
            warn!("lock: could not run {:?}: {}", program, e);
            None
        }
    }
}

/// Session lock state, from polling a configured command.
pub struct LockStateSource {
    argv: Vec<String>,
    interval: Duration,
}

impl LockStateSource {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            interval: LOCK_POLL_INTERVAL,
        }
    }
}

#[async_trait]
impl StateSource for LockStateSource {
    type State = bool;

    fn name(&self) -> &'static str {
        "lock"
    }

    /// Never ends; a command that cannot start keeps the previous state.
    async fn connect(&self) -> Result<StateStream<bool>> {
        if self.argv.is_empty() {
            return Err(anyhow!("empty lock-state command"));
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let argv = self.argv.clone();
        Ok(IntervalStream::new(ticker)
            .then(move |_| {
                let argv = argv.clone();
                async move { query_locked(&argv).await }
            })
            .filter_map(future::ready)
            .map(Ok)
            .boxed())
    }
}
