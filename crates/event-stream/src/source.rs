//! Long-lived event stream connection

use crate::error::{Error, Result};
use crate::parser::{Parser, DEFAULT_EVENT_TYPE};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::{header, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Event source configuration
#[derive(Debug, Clone)]
pub struct EventSourceConfig {
    /// Reconnection delay until the server advises one with `retry:`
    pub retry: Duration,
    /// Buffered payloads before the reader waits for the consumer
    pub capacity: usize,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            retry: Duration::from_secs(3),
            capacity: 64,
        }
    }
}

/// Server-push connection delivering `message` payloads in order
///
/// The reader task lives as long as this value; dropping it closes the
/// connection.
pub struct EventSource {
    rx: mpsc::Receiver<String>,
    last_event_id: Arc<Mutex<Option<String>>>,
    reader: JoinHandle<()>,
}

impl EventSource {
    /// Connect to `url`; failure of this first attempt is returned as an error
    pub async fn connect(url: &str, config: EventSourceConfig) -> Result<Self> {
        Self::connect_with(reqwest::Client::new(), url, config).await
    }

    pub async fn connect_with(
        http: reqwest::Client,
        url: &str,
        config: EventSourceConfig,
    ) -> Result<Self> {
        let resp = open(&http, url, None).await?;
        tracing::info!("Event stream connected to {}", url);

        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let last_event_id = Arc::new(Mutex::new(None));
        let reader = Reader {
            http,
            url: url.to_string(),
            retry: config.retry,
            parser: Parser::new(),
            tx,
            last_event_id: last_event_id.clone(),
        };
        let reader = tokio::spawn(reader.run(resp));

        Ok(Self {
            rx,
            last_event_id,
            reader,
        })
    }

    /// Next payload; `None` once the reader has stopped
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Id of the most recent event seen on the stream
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn open(http: &reqwest::Client, url: &str, last_event_id: Option<&str>) -> Result<Response> {
    let mut req = http
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache");
    if let Some(id) = last_event_id {
        req = req.header(LAST_EVENT_ID, id);
    }
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Status {
            status: status.to_string(),
            body,
        });
    }
    Ok(resp)
}

enum Pumped {
    Ended,
    ConsumerGone,
}

struct Reader {
    http: reqwest::Client,
    url: String,
    retry: Duration,
    parser: Parser,
    tx: mpsc::Sender<String>,
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl Reader {
    async fn run(mut self, mut resp: Response) {
        loop {
            match self.pump(resp).await {
                Ok(Pumped::ConsumerGone) => return,
                Ok(Pumped::Ended) => tracing::warn!("Event stream closed by server"),
                Err(e) => tracing::warn!("Event stream read error: {}", e),
            }
            self.parser.reset();

            resp = loop {
                let delay = self.parser.retry().unwrap_or(self.retry);
                tokio::time::sleep(delay).await;
                if self.tx.is_closed() {
                    return;
                }
                match open(&self.http, &self.url, self.parser.last_event_id()).await {
                    Ok(resp) => break resp,
                    Err(e) => tracing::warn!("Event stream reconnect failed: {}", e),
                }
            };
            tracing::info!(
                "Event stream reconnected (last id {:?})",
                self.parser.last_event_id()
            );
        }
    }

    async fn pump(&mut self, resp: Response) -> std::result::Result<Pumped, reqwest::Error> {
        let mut stream = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                let Some(event) = self.parser.feed_line(&String::from_utf8_lossy(&line)) else {
                    continue;
                };
                *self.last_event_id.lock() = event.id.clone();
                if event.kind != DEFAULT_EVENT_TYPE {
                    tracing::debug!("Dropping {} event", event.kind);
                    continue;
                }
                tracing::trace!("Event: {}", event.data);
                if self.tx.send(event.data).await.is_err() {
                    return Ok(Pumped::ConsumerGone);
                }
            }
        }
        Ok(Pumped::Ended)
    }
}
