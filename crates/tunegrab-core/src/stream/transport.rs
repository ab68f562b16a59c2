//! libcurl-backed event stream: one GET per handle, read on a dedicated thread.
//!
//! The worker decodes frames as bytes arrive and pushes samples into the
//! handle's channel. It stops as soon as the handle is closed: the write
//! callback refuses data and the progress callback (called about once per
//! second even while idle) aborts the transfer.

use std::cell::Cell;
use std::str;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use super::sse::SseDecoder;
use super::{decode_frame, StreamConnector, StreamEvent, StreamHandle};
use crate::error::StreamError;

/// Events buffered between the transport thread and the consumer.
const EVENT_BUFFER: usize = 64;

/// Opens progress streams over HTTP(S) using libcurl.
#[derive(Debug, Clone)]
pub struct CurlConnector {
    connect_timeout: Duration,
}

impl Default for CurlConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl CurlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl StreamConnector for CurlConnector {
    fn open(&self, endpoint: &str) -> Result<StreamHandle, StreamError> {
        let parsed = url::Url::parse(endpoint).map_err(|e| StreamError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StreamError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = Arc::new(AtomicBool::new(false));
        let malformed = Arc::new(AtomicU64::new(0));
        let worker = StreamWorker {
            endpoint: endpoint.to_string(),
            connect_timeout: self.connect_timeout,
            tx,
            cancel: Arc::clone(&cancel),
            malformed: Arc::clone(&malformed),
        };
        thread::Builder::new()
            .name("tunegrab-stream".to_string())
            .spawn(move || worker.run())?;
        tracing::debug!(endpoint, "progress stream opened");

        Ok(StreamHandle::new(endpoint, rx, cancel).with_malformed_counter(malformed))
    }
}

struct StreamWorker {
    endpoint: String,
    connect_timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
    cancel: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
}

impl StreamWorker {
    fn run(self) {
        let outcome = self.transfer();
        if self.cancel.load(Ordering::Relaxed) {
            tracing::debug!(endpoint = %self.endpoint, "stream worker stopped after close");
            return;
        }
        let reason = match outcome {
            Ok(()) => {
                tracing::info!(endpoint = %self.endpoint, "progress stream ended");
                None
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, "progress stream failed: {}", e);
                Some(e)
            }
        };
        let _ = self.tx.blocking_send(StreamEvent::Disconnected(reason));
    }

    /// Run the GET to completion. Err carries a transport or HTTP failure.
    fn transfer(&self) -> Result<(), String> {
        let curl_err = |e: curl::Error| e.to_string();

        let mut easy = curl::easy::Easy::new();
        easy.url(&self.endpoint).map_err(curl_err)?;
        easy.get(true).map_err(curl_err)?;
        easy.follow_location(true).map_err(curl_err)?;
        easy.connect_timeout(self.connect_timeout).map_err(curl_err)?;
        easy.progress(true).map_err(curl_err)?;

        let mut list = curl::easy::List::new();
        list.append("Accept: text/event-stream").map_err(curl_err)?;
        list.append("Cache-Control: no-cache").map_err(curl_err)?;
        easy.http_headers(list).map_err(curl_err)?;

        // Status of the last response seen (redirects produce several).
        let status: Cell<Option<u32>> = Cell::new(None);
        let mut decoder = SseDecoder::new();

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Some(code) = str::from_utf8(data).ok().and_then(parse_status_line) {
                        status.set(Some(code));
                    }
                    true
                })
                .map_err(curl_err)?;
            transfer
                .write_function(|data| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return Ok(0);
                    }
                    if !status.get().map_or(true, is_success) {
                        return Ok(0);
                    }
                    let payloads = decoder.feed(data);
                    let oversized = decoder.take_dropped();
                    if oversized > 0 {
                        let dropped = self.malformed.fetch_add(oversized, Ordering::Relaxed) + oversized;
                        tracing::warn!(endpoint = %self.endpoint, dropped, "dropping oversized progress frame");
                    }
                    for payload in payloads {
                        let Some(sample) = decode_frame(&self.endpoint, &payload, &self.malformed)
                        else {
                            continue;
                        };
                        if self.tx.blocking_send(StreamEvent::Sample(sample)).is_err() {
                            return Ok(0);
                        }
                    }
                    Ok(data.len())
                })
                .map_err(curl_err)?;
            transfer
                .progress_function(|_, _, _, _| !self.cancel.load(Ordering::Relaxed))
                .map_err(curl_err)?;
            transfer.perform()
        };

        if let Some(code) = status.get() {
            if !is_success(code) {
                return Err(format!("HTTP {code}"));
            }
        }
        performed.map_err(curl_err)
    }
}

pub(crate) fn is_success(code: u32) -> bool {
    (200..300).contains(&code)
}

/// "HTTP/1.1 200 OK" -> 200. Other header lines -> None.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim_end();
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}
