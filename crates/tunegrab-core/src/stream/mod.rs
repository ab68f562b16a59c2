//! Progress event stream: one server-push channel per open handle.
//!
//! A [`StreamConnector`] opens the channel and returns a [`StreamHandle`]
//! that yields [`StreamEvent`]s in arrival order. The handle owns the
//! channel: closing it (explicitly or on drop) cancels the transport.
//! There is no reconnection and no built-in timeout.

mod transport;
pub mod sse;

pub use self::transport::CurlConnector;
pub(crate) use self::transport::{is_success, parse_status_line};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::sample::{parse_sample, ProgressSample};

/// Something delivered by an open stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Sample(ProgressSample),
    /// Transport ended. `None` is a clean end of stream, `Some` carries the
    /// transport or HTTP error. Always the last event of a handle.
    Disconnected(Option<String>),
}

/// Opens progress streams. Implemented over libcurl by [`CurlConnector`].
pub trait StreamConnector: Send + Sync {
    fn open(&self, endpoint: &str) -> Result<StreamHandle, StreamError>;
}

/// Owned, open progress stream.
#[derive(Debug)]
pub struct StreamHandle {
    endpoint: String,
    events: mpsc::Receiver<StreamEvent>,
    cancel: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
    closed: bool,
}

impl StreamHandle {
    /// Wrap a producer channel. The producer must stop once `cancel` is set.
    pub fn new(
        endpoint: impl Into<String>,
        events: mpsc::Receiver<StreamEvent>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            events,
            cancel,
            malformed: Arc::new(AtomicU64::new(0)),
            closed: false,
        }
    }

    /// Share a dropped-frame counter with the producer.
    pub fn with_malformed_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.malformed = counter;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Frames dropped so far because they could not be decoded.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Next event in arrival order; `None` once closed or the producer is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// Stop delivery and cancel the transport. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.store(true, Ordering::Relaxed);
        self.events.close();
        tracing::debug!(endpoint = %self.endpoint, "progress stream closed");
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Close and release whatever handle is in `slot`. No-op when empty.
pub fn close_stream(slot: &mut Option<StreamHandle>) {
    if let Some(mut handle) = slot.take() {
        handle.close();
    }
}

/// Decode one frame payload, counting and logging it when malformed.
pub(crate) fn decode_frame(
    endpoint: &str,
    payload: &str,
    malformed: &AtomicU64,
) -> Option<ProgressSample> {
    match parse_sample(payload) {
        Ok(sample) => Some(sample),
        Err(e) => {
            let dropped = malformed.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(endpoint, dropped, "dropping malformed progress frame: {}", e);
            None
        }
    }
}
