//! Progress samples as published by the backend on its event stream.
//!
//! The backend sends one JSON object per frame:
//! `{"downloaded": 1.5, "total": 4.0, "speed": 0.8, "status": "downloading"}`
//! with sizes in MB and speed in MB/s.

use serde::Deserialize;

use crate::error::SampleError;

/// Job status carried by a sample. Anything that is not a terminal status
/// (queued, starting, downloading, processing, ...) is `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    InProgress,
    Finished,
    Error,
}

impl SampleStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "finished" => SampleStatus::Finished,
            "error" => SampleStatus::Error,
            _ => SampleStatus::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SampleStatus::InProgress)
    }
}

/// One progress event. Ephemeral: consumed as soon as it is received.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// MB transferred so far.
    pub downloaded: f64,
    /// Expected final size in MB; 0 means unknown.
    pub total: f64,
    /// Instantaneous rate in MB/s.
    pub speed: f64,
    pub status: SampleStatus,
    /// Backend message attached to error frames.
    pub error: Option<String>,
}

impl ProgressSample {
    pub fn in_progress(downloaded: f64, total: f64, speed: f64) -> Self {
        Self {
            downloaded,
            total,
            speed,
            status: SampleStatus::InProgress,
            error: None,
        }
    }

    pub fn with_status(mut self, status: SampleStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Deserialize)]
struct WireSample {
    #[serde(default)]
    downloaded: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    status: String,
    #[serde(default)]
    error: Option<String>,
}

fn non_negative(field: &'static str, value: Option<f64>) -> Result<f64, SampleError> {
    let value = value.unwrap_or(0.0);
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SampleError::OutOfRange { field, value })
    }
}

/// Decode the `data` payload of one stream frame.
///
/// `status` is required; absent or `null` numbers read as 0.
pub fn parse_sample(data: &str) -> Result<ProgressSample, SampleError> {
    let wire: WireSample = serde_json::from_str(data)?;
    Ok(ProgressSample {
        downloaded: non_negative("downloaded", wire.downloaded)?,
        total: non_negative("total", wire.total)?,
        speed: non_negative("speed", wire.speed)?,
        status: SampleStatus::from_wire(&wire.status),
        error: wire.error,
    })
}
