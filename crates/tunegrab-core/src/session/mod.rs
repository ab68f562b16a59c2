//! One download session: trigger the job, watch its progress stream, feed the chart.
//!
//! The controller is the single consumer of the active stream. All state
//! changes happen in [`SessionController::handle_event`], one event at a time:
//!
//! - `Idle -> Active` on [`SessionController::start_session`] (from any state),
//! - `Active -> Active` on each in-progress sample,
//! - `Active -> Terminated` on a finished/error sample or when the transport ends.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::api::JobAck;
use crate::config::TunegrabConfig;
use crate::error::{ApiError, SessionError};
use crate::presenter::{present, DisplayState};
use crate::sample::{ProgressSample, SampleStatus};
use crate::smoother::{SmoothedSeries, SpeedSmoother};
use crate::stream::{close_stream, StreamConnector, StreamEvent, StreamHandle};

/// Result of asking the backend to start a job.
pub type JobResponse = Result<JobAck, ApiError>;

/// Starts the server-side job. Fire-and-forget from the session's point of
/// view: the response is reported when it arrives but never awaited first.
pub trait JobTrigger: Send + Sync {
    /// Must be called from within a Tokio runtime.
    fn trigger(&self, url: &str) -> JoinHandle<JobResponse>;
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished,
    /// Backend reported an error status, with its message if any.
    Failed(Option<String>),
    /// Stream ended without a terminal status.
    Disconnected(Option<String>),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Finished)
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Finished => "download complete".to_string(),
            Outcome::Failed(Some(msg)) => format!("download failed: {msg}"),
            Outcome::Failed(None) => "download failed".to_string(),
            Outcome::Disconnected(Some(msg)) => {
                format!("stream ended without terminal status: {msg}")
            }
            Outcome::Disconnected(None) => "stream ended without terminal status".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Active,
    Terminated(Outcome),
}

/// Everything the UI needs after one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleUpdate {
    pub display: DisplayState,
    pub smoothed_speed: f64,
    /// Set when this sample ended the session.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Sample(SampleUpdate),
    JobAccepted(JobAck),
    /// The job trigger failed. The session stays active; the caller decides.
    JobRejected(String),
    /// Transport ended before a terminal status; the session is terminated.
    StreamEnded(Option<String>),
}

enum Wake {
    Job(Result<JobResponse, JoinError>),
    Stream(Option<StreamEvent>),
}

/// Orchestrates a single download session at a time.
pub struct SessionController {
    connector: Arc<dyn StreamConnector>,
    jobs: Arc<dyn JobTrigger>,
    progress_endpoint: String,
    smoother: SpeedSmoother,
    stream: Option<StreamHandle>,
    job: Option<JoinHandle<JobResponse>>,
    state: SessionState,
    url: Option<String>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        jobs: Arc<dyn JobTrigger>,
        progress_endpoint: impl Into<String>,
        smoother: SpeedSmoother,
    ) -> Self {
        Self {
            connector,
            jobs,
            progress_endpoint: progress_endpoint.into(),
            smoother,
            stream: None,
            job: None,
            state: SessionState::Idle,
            url: None,
        }
    }

    /// Controller wired with the configured endpoint and chart parameters.
    pub fn from_config(
        cfg: &TunegrabConfig,
        connector: Arc<dyn StreamConnector>,
        jobs: Arc<dyn JobTrigger>,
    ) -> anyhow::Result<Self> {
        let chart = cfg.chart();
        Ok(Self::new(
            connector,
            jobs,
            cfg.progress_endpoint()?,
            SpeedSmoother::new(chart.smoothing_factor, chart.window),
        ))
    }

    /// Begin a new session for `url`, closing any stream left from a previous one.
    pub fn start_session(&mut self, url: &str) -> Result<(), SessionError> {
        let url = url.trim();
        if url.is_empty() {
            tracing::warn!("refusing to start session without a resource url");
            return Err(SessionError::EmptyUrl);
        }

        close_stream(&mut self.stream);
        self.job = None;
        self.smoother.reset();
        self.state = SessionState::Idle;
        self.url = None;

        let handle = self.connector.open(&self.progress_endpoint)?;
        self.stream = Some(handle);
        self.job = Some(self.jobs.trigger(url));
        self.url = Some(url.to_string());
        self.state = SessionState::Active;
        tracing::info!(url, endpoint = %self.progress_endpoint, "session started");
        Ok(())
    }

    /// End the current session without an outcome and return to `Idle`.
    pub fn reset(&mut self) {
        close_stream(&mut self.stream);
        self.job = None;
        self.smoother.reset();
        self.state = SessionState::Idle;
        self.url = None;
    }

    /// Wait for the next stream event or job-trigger response and apply it.
    /// Returns `None` when no session is active.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        if !self.is_active() {
            return None;
        }
        let stream = self.stream.as_mut()?;
        let wake = match self.job.as_mut() {
            Some(job) => tokio::select! {
                res = job => Wake::Job(res),
                ev = stream.next_event() => Wake::Stream(ev),
            },
            None => Wake::Stream(stream.next_event().await),
        };
        match wake {
            Wake::Job(res) => {
                self.job = None;
                Some(self.on_job_response(res))
            }
            Wake::Stream(Some(event)) => self.handle_event(event),
            Wake::Stream(None) => self.handle_event(StreamEvent::Disconnected(None)),
        }
    }

    /// Apply one stream event. Events are ignored unless the session is active.
    pub fn handle_event(&mut self, event: StreamEvent) -> Option<SessionUpdate> {
        if !self.is_active() {
            tracing::trace!(?event, "ignoring stream event outside an active session");
            return None;
        }
        match event {
            StreamEvent::Sample(sample) => Some(SessionUpdate::Sample(self.apply_sample(&sample))),
            StreamEvent::Disconnected(error) => {
                self.terminate(Outcome::Disconnected(error.clone()));
                Some(SessionUpdate::StreamEnded(error))
            }
        }
    }

    fn apply_sample(&mut self, sample: &ProgressSample) -> SampleUpdate {
        let display = present(sample);
        let smoothed_speed = self.smoother.ingest(sample.speed);
        let outcome = match sample.status {
            SampleStatus::InProgress => None,
            SampleStatus::Finished => Some(Outcome::Finished),
            SampleStatus::Error => Some(Outcome::Failed(sample.error.clone())),
        };
        if let Some(outcome) = &outcome {
            self.terminate(outcome.clone());
        }
        SampleUpdate {
            display,
            smoothed_speed,
            outcome,
        }
    }

    fn on_job_response(&self, res: Result<JobResponse, JoinError>) -> SessionUpdate {
        match res {
            Ok(Ok(ack)) => SessionUpdate::JobAccepted(ack),
            Ok(Err(e)) => {
                tracing::warn!(url = ?self.url, "download job trigger failed: {}", e);
                SessionUpdate::JobRejected(e.to_string())
            }
            Err(e) => {
                tracing::warn!(url = ?self.url, "download job trigger task failed: {}", e);
                SessionUpdate::JobRejected(ApiError::Join(e.to_string()).to_string())
            }
        }
    }

    fn terminate(&mut self, outcome: Outcome) {
        close_stream(&mut self.stream);
        self.job = None;
        if outcome.is_success() {
            tracing::info!(url = ?self.url, "session finished");
        } else {
            tracing::warn!(url = ?self.url, "session ended: {}", outcome.describe());
        }
        self.state = SessionState::Terminated(outcome);
    }

    /// Display values for `sample`; does not touch session state.
    pub fn present_sample(&self, sample: &ProgressSample) -> DisplayState {
        present(sample)
    }

    /// Smoothed speed history for the chart, oldest first.
    pub fn series(&self) -> &SmoothedSeries {
        self.smoother.series()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    pub fn has_open_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamHandle::is_open)
    }

    /// Frames dropped on the current stream because they were malformed.
    pub fn malformed_frames(&self) -> u64 {
        self.stream.as_ref().map_or(0, StreamHandle::malformed_frames)
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

#[cfg(test)]
mod tests;
