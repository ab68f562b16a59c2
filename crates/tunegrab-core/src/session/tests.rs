//! Session state machine tests with an in-memory stream and job trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::*;
use crate::error::StreamError;

struct OpenedStream {
    tx: Option<mpsc::Sender<StreamEvent>>,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct FakeConnector {
    opened: Mutex<Vec<OpenedStream>>,
    refuse: AtomicBool,
}

impl FakeConnector {
    fn open_streams(&self) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !s.cancel.load(Ordering::Relaxed))
            .count()
    }

    fn total_opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    fn sender(&self, idx: usize) -> mpsc::Sender<StreamEvent> {
        self.opened.lock().unwrap()[idx].tx.clone().unwrap()
    }

    /// Drop the producer side, as a transport disconnect would.
    fn hang_up(&self, idx: usize) {
        self.opened.lock().unwrap()[idx].tx = None;
    }
}

impl StreamConnector for FakeConnector {
    fn open(&self, endpoint: &str) -> Result<StreamHandle, StreamError> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(StreamError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "refused".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(32);
        let cancel = Arc::new(AtomicBool::new(false));
        self.opened.lock().unwrap().push(OpenedStream {
            tx: Some(tx),
            cancel: Arc::clone(&cancel),
        });
        Ok(StreamHandle::new(endpoint, rx, cancel))
    }
}

enum JobMode {
    /// Never answers, so only stream events wake the session.
    Silent,
    Accept,
    Reject,
}

struct FakeJobs {
    mode: JobMode,
    calls: Mutex<Vec<String>>,
}

impl FakeJobs {
    fn new(mode: JobMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl JobTrigger for FakeJobs {
    fn trigger(&self, url: &str) -> JoinHandle<JobResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.mode {
            JobMode::Silent => tokio::spawn(std::future::pending::<JobResponse>()),
            JobMode::Accept => tokio::spawn(async {
                Ok(JobAck {
                    task_id: Some("abc123".to_string()),
                })
            }),
            JobMode::Reject => tokio::spawn(async {
                Err(ApiError::Rejected("No url provided".to_string()))
            }),
        }
    }
}

fn controller(mode: JobMode) -> (Arc<FakeConnector>, Arc<FakeJobs>, SessionController) {
    let connector = Arc::new(FakeConnector::default());
    let jobs = Arc::new(FakeJobs::new(mode));
    let session = SessionController::new(
        connector.clone(),
        jobs.clone(),
        "http://backend/progress",
        SpeedSmoother::default(),
    );
    (connector, jobs, session)
}

fn sample(downloaded: f64, total: f64, speed: f64) -> StreamEvent {
    StreamEvent::Sample(ProgressSample::in_progress(downloaded, total, speed))
}

fn terminal(status: SampleStatus, error: Option<&str>) -> StreamEvent {
    let mut s = ProgressSample::in_progress(10.0, 10.0, 0.0).with_status(status);
    s.error = error.map(str::to_string);
    StreamEvent::Sample(s)
}

#[tokio::test]
async fn empty_url_is_rejected_before_any_io() {
    let (connector, jobs, mut session) = controller(JobMode::Silent);
    assert!(matches!(session.start_session("   "), Err(SessionError::EmptyUrl)));
    assert_eq!(connector.total_opened(), 0);
    assert!(jobs.calls.lock().unwrap().is_empty());
    assert_eq!(session.state(), &SessionState::Idle);
}

#[tokio::test]
async fn start_opens_stream_and_triggers_job() {
    let (connector, jobs, mut session) = controller(JobMode::Silent);
    session.start_session(" https://youtu.be/x ").unwrap();
    assert_eq!(session.state(), &SessionState::Active);
    assert!(session.has_open_stream());
    assert_eq!(connector.open_streams(), 1);
    assert_eq!(jobs.calls.lock().unwrap().as_slice(), ["https://youtu.be/x"]);
    assert_eq!(session.url(), Some("https://youtu.be/x"));
}

#[tokio::test]
async fn restarting_leaves_exactly_one_open_stream() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.handle_event(sample(1.0, 10.0, 2.0));
    session.start_session("https://b").unwrap();
    assert_eq!(connector.total_opened(), 2);
    assert_eq!(connector.open_streams(), 1);
    // Fresh session: history cleared and first sample taken verbatim.
    assert!(session.series().is_empty());
    match session.handle_event(sample(1.0, 10.0, 7.0)) {
        Some(SessionUpdate::Sample(u)) => assert_eq!(u.smoothed_speed, 7.0),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn samples_feed_presenter_and_chart() {
    let (_connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.handle_event(sample(10.0, 100.0, 5.0));
    let update = match session.handle_event(sample(50.0, 100.0, 10.0)) {
        Some(SessionUpdate::Sample(u)) => u,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(update.display.percent_label(), "50.00");
    assert!((update.smoothed_speed - 6.5).abs() < 1e-9);
    assert!(update.outcome.is_none());
    assert_eq!(session.series().len(), 2);
    assert!(session.is_active());
}

#[tokio::test]
async fn finished_terminates_and_ignores_later_samples() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.handle_event(sample(5.0, 10.0, 1.0));
    match session.handle_event(terminal(SampleStatus::Finished, None)) {
        Some(SessionUpdate::Sample(u)) => assert_eq!(u.outcome, Some(Outcome::Finished)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state(), &SessionState::Terminated(Outcome::Finished));
    assert!(!session.has_open_stream());
    assert_eq!(connector.open_streams(), 0);

    let len = session.series().len();
    assert!(session.handle_event(sample(6.0, 10.0, 9.0)).is_none());
    assert_eq!(session.series().len(), len);
    assert!(session.next_update().await.is_none());
}

#[tokio::test]
async fn error_status_is_not_success() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.handle_event(terminal(SampleStatus::Error, Some("Download error")));
    match session.state() {
        SessionState::Terminated(outcome) => {
            assert!(!outcome.is_success());
            assert_eq!(outcome, &Outcome::Failed(Some("Download error".to_string())));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(connector.open_streams(), 0);
}

#[tokio::test]
async fn next_update_consumes_stream_in_order() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    let tx = connector.sender(0);
    for speed in [1.0, 2.0, 3.0] {
        tx.send(sample(speed, 10.0, speed)).await.unwrap();
    }
    tx.send(terminal(SampleStatus::Finished, None)).await.unwrap();

    let mut seen = Vec::new();
    while let Some(update) = session.next_update().await {
        if let SessionUpdate::Sample(u) = update {
            seen.push(u.display.downloaded_label.clone());
        }
    }
    assert_eq!(seen, ["1.00", "2.00", "3.00", "10.00"]);
    assert_eq!(session.state(), &SessionState::Terminated(Outcome::Finished));
}

#[tokio::test]
async fn silent_hang_up_is_reported_as_disconnected() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    connector.sender(0).send(sample(1.0, 10.0, 1.0)).await.unwrap();
    connector.hang_up(0);

    assert!(matches!(session.next_update().await, Some(SessionUpdate::Sample(_))));
    assert_eq!(session.next_update().await, Some(SessionUpdate::StreamEnded(None)));
    assert_eq!(
        session.state(),
        &SessionState::Terminated(Outcome::Disconnected(None))
    );
    assert!(session.next_update().await.is_none());
}

#[tokio::test]
async fn transport_error_is_carried() {
    let (_connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    let update = session.handle_event(StreamEvent::Disconnected(Some("HTTP 500".to_string())));
    assert_eq!(update, Some(SessionUpdate::StreamEnded(Some("HTTP 500".to_string()))));
    assert_eq!(
        session.state(),
        &SessionState::Terminated(Outcome::Disconnected(Some("HTTP 500".to_string())))
    );
}

#[tokio::test]
async fn job_acceptance_is_reported() {
    let (_connector, _jobs, mut session) = controller(JobMode::Accept);
    session.start_session("https://a").unwrap();
    assert_eq!(
        session.next_update().await,
        Some(SessionUpdate::JobAccepted(JobAck {
            task_id: Some("abc123".to_string())
        }))
    );
    assert!(session.is_active());
}

#[tokio::test]
async fn job_rejection_keeps_session_active() {
    let (connector, _jobs, mut session) = controller(JobMode::Reject);
    session.start_session("https://a").unwrap();
    match session.next_update().await {
        Some(SessionUpdate::JobRejected(msg)) => assert!(msg.contains("No url provided")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(session.is_active());
    connector.sender(0).send(sample(1.0, 2.0, 3.0)).await.unwrap();
    assert!(matches!(session.next_update().await, Some(SessionUpdate::Sample(_))));
}

#[tokio::test]
async fn failed_open_leaves_session_idle() {
    let (connector, jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    connector.refuse.store(true, Ordering::Relaxed);
    assert!(matches!(session.start_session("https://b"), Err(SessionError::Stream(_))));
    assert_eq!(session.state(), &SessionState::Idle);
    assert_eq!(connector.open_streams(), 0);
    assert_eq!(jobs.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn restart_after_termination_is_clean() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.handle_event(terminal(SampleStatus::Finished, None));
    session.start_session("https://a").unwrap();
    assert!(session.is_active());
    assert!(session.series().is_empty());
    assert_eq!(connector.open_streams(), 1);
}

#[tokio::test]
async fn reset_closes_stream_and_returns_to_idle() {
    let (connector, _jobs, mut session) = controller(JobMode::Silent);
    session.start_session("https://a").unwrap();
    session.reset();
    session.reset();
    assert_eq!(session.state(), &SessionState::Idle);
    assert_eq!(connector.open_streams(), 0);
    assert!(session.next_update().await.is_none());
}
