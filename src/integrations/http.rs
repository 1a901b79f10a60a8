//! Shared HTTP plumbing for the web integrations.

use anyhow::{anyhow, Result};
use reqwest::{Client, Method, RequestBuilder};
use std::time::Duration;
use url::Url;

use crate::config::HttpEndpoint;

/// Connect timeout for long-lived event streams. No overall timeout there,
/// the stream is supposed to stay open.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A configured base URL plus optional basic-auth credentials.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base: Url,
    credentials: Option<(String, String)>,
}

impl Endpoint {
    pub fn from_config(config: &HttpEndpoint) -> Result<Self> {
        Ok(Self {
            base: config.base_url()?,
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
        })
    }

    /// `path` is appended verbatim (it starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    pub fn request(&self, client: &Client, method: Method, path: &str) -> RequestBuilder {
        let request = client.request(method, self.url(path));
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }
}

/// Client for short request/response calls.
pub fn request_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("rotaryboard/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("failed to create HTTP client: {}", e))
}

/// Client for Server-Sent Event streams.
pub fn stream_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("rotaryboard/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(STREAM_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("failed to create HTTP client: {}", e))
}
