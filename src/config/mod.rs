//! Configuration management
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. config file (`config.yaml` by default; YAML, TOML or JSON by extension)
//! 3. environment (`ROTARYBOARD_PORT`, `ROTARYBOARD_FOOBAR__URL`, ...)
//! 4. command line overrides

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::gesture::GestureConfig;
use crate::transport::DEFAULT_BAUD;

/// Env var naming the config file when none is given on the command line
pub const CONFIG_PATH_ENV: &str = "ROTARYBOARD_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "ROTARYBOARD";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Serial port the panel is attached to (e.g. `/dev/ttyUSB0`, `COM3`)
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    #[serde(default)]
    pub gesture: GestureSettings,

    /// foobar2000 beefweb endpoint; absent disables the player integration
    #[serde(default)]
    pub foobar: Option<HttpEndpoint>,

    #[serde(default)]
    pub nothub: Option<HttpEndpoint>,

    /// File with IRC notification counters
    #[serde(default)]
    pub irc: Option<PathBuf>,

    #[serde(default)]
    pub desktop: DesktopConfig,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

#[derive(Debug, Clone, Deserialize)]
pub struct GestureSettings {
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    #[serde(default = "default_direction_error_threshold")]
    pub direction_error_threshold: u32,
}

fn default_long_press_ms() -> u64 {
    250
}

fn default_direction_error_threshold() -> u32 {
    5
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            long_press_ms: default_long_press_ms(),
            direction_error_threshold: default_direction_error_threshold(),
        }
    }
}

impl From<&GestureSettings> for GestureConfig {
    fn from(settings: &GestureSettings) -> Self {
        GestureConfig {
            long_press: Duration::from_millis(settings.long_press_ms),
            direction_error_threshold: settings.direction_error_threshold,
        }
    }
}

/// Base URL plus optional basic-auth credentials
#[derive(Debug, Clone, Deserialize)]
pub struct HttpEndpoint {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl HttpEndpoint {
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).with_context(|| format!("invalid url {:?}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported url scheme {:?} in {:?}", url.scheme(), self.url);
        }
        Ok(url)
    }

    /// Credentials are only used when both parts are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// External commands (argv) for desktop actions. Unset entries are no-ops.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesktopConfig {
    pub lock: Option<Vec<String>>,
    pub monitors_off: Option<Vec<String>>,
    pub monitors_on: Option<Vec<String>>,
    /// Polled every second; exit status 0 means the session is locked.
    pub lock_state: Option<Vec<String>>,
}

impl Config {
    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            bail!("no port specified");
        }
        if self.baud == 0 {
            bail!("baud rate must be positive");
        }
        if self.gesture.long_press_ms == 0 {
            bail!("gesture.long_press_ms must be positive");
        }
        if let Some(foobar) = &self.foobar {
            foobar.base_url().context("foobar")?;
        }
        if let Some(nothub) = &self.nothub {
            nothub.base_url().context("nothub")?;
        }
        if let Some(irc) = &self.irc {
            let meta = std::fs::metadata(irc)
                .with_context(|| format!("could not stat irc file {}", irc.display()))?;
            if !meta.is_file() {
                bail!("irc file {} is not a regular file", irc.display());
            }
        }
        for (name, argv) in [
            ("lock", &self.desktop.lock),
            ("monitors_off", &self.desktop.monitors_off),
            ("monitors_on", &self.desktop.monitors_on),
            ("lock_state", &self.desktop.lock_state),
        ] {
            if matches!(argv, Some(argv) if argv.is_empty()) {
                bail!("desktop.{} must name a program", name);
            }
        }
        Ok(())
    }
}

/// Resolve which config file to read: explicit path, then `ROTARYBOARD_CONFIG`,
/// then `config.yaml` in the working directory. Only the default may be missing.
fn config_file(path: Option<&Path>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path.to_path_buf(), true);
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return (PathBuf::from(path), true);
        }
    }
    (PathBuf::from(DEFAULT_CONFIG_FILE), false)
}

pub fn load_config(path: Option<&Path>, port_override: Option<&str>) -> Result<Config> {
    let (file, required) = config_file(path);

    let mut builder = ::config::Config::builder()
        // Start with defaults
        .set_default("baud", i64::from(DEFAULT_BAUD))?
        // Load from config file
        .add_source(::config::File::from(file.as_path()).required(required))
        // Override with environment variables (ROTARYBOARD_PORT, ROTARYBOARD_FOOBAR__URL, etc.)
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    if let Some(port) = port_override {
        builder = builder.set_override("port", port)?;
    }

    let config: Config = builder
        .build()
        .with_context(|| format!("could not load config from {}", file.display()))?
        .try_deserialize()
        .map_err(|e| anyhow!("invalid config: {}", e))?;

    config.validate()?;
    Ok(config)
}
