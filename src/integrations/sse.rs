//! Minimal Server-Sent Events reader: only `data:` fields matter here.

use anyhow::{anyhow, Result};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};

use super::http::Endpoint;

/// Incremental decoder turning raw chunks into event payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk, get back the data of every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        events
    }
}

/// Open `path` as an event stream and yield each event's data.
pub async fn subscribe(
    client: &Client,
    endpoint: &Endpoint,
    path: &str,
) -> Result<BoxStream<'static, Result<String>>> {
    let response = endpoint
        .request(client, Method::GET, path)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "event stream {} returned {}",
            path,
            response.status()
        ));
    }

    let mut decoder = SseDecoder::default();
    Ok(response
        .bytes_stream()
        .map_err(|e| anyhow!("event stream read failed: {}", e))
        .map_ok(move |chunk| {
            let events = decoder.feed(&chunk);
            stream::iter(events.into_iter().map(Ok::<_, anyhow::Error>))
        })
        .try_flatten()
        .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.feed(b"1}\n\n"), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b": keepalive\r\nevent: x\r\ndata: one\r\ndata:two\r\n\r\n");
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"\n\nid: 3\n\n").is_empty());
    }
}
