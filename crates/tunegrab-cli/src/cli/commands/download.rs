//! `tunegrab download <url>`: trigger the job and follow its progress stream.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;
use tunegrab_core::session::{SessionController, SessionState, SessionUpdate};
use tunegrab_core::smoother::SmoothedSeries;
use tunegrab_core::stream::CurlConnector;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Abort when no stream event or job response arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// Print the smoothed speed sparkline at the end.
    pub chart: bool,
    /// Save the finished file here (directory or file path).
    pub output: Option<PathBuf>,
}

pub async fn run_download(cfg: &TunegrabConfig, url: &str, opts: DownloadOptions) -> Result<()> {
    let connector = Arc::new(CurlConnector::new(cfg.connect_timeout()));
    let client = BackendClient::from_config(cfg);
    let mut session = SessionController::from_config(cfg, connector, Arc::new(client.clone()))?;

    session.start_session(url)?;
    println!("Downloading {}", url.trim());
    let task_id = follow_session(&mut session, &opts).await?;

    match (opts.output, task_id) {
        (Some(dest), Some(task_id)) => {
            let saved = tokio::task::spawn_blocking(move || client.fetch_file(&task_id, &dest))
                .await
                .context("file request task")?
                .context("save finished file")?;
            println!("Saved {} ({} bytes)", saved.path.display(), saved.bytes);
        }
        (Some(_), None) => bail!("backend sent no task id; cannot fetch the file"),
        (None, Some(task_id)) => println!("Fetch the file with: tunegrab fetch {task_id}"),
        (None, None) => {}
    }
    Ok(())
}

/// Print updates until the session ends. Returns the backend task id when
/// the job was acknowledged; errors unless the session finished.
async fn follow_session(
    session: &mut SessionController,
    opts: &DownloadOptions,
) -> Result<Option<String>> {
    let mut task_id = None;
    loop {
        let next = match opts.idle_timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, session.next_update()).await;
                match waited {
                    Ok(next) => next,
                    Err(_) => {
                        session.reset();
                        bail!("no progress for {}s, giving up", limit.as_secs_f64());
                    }
                }
            }
            None => session.next_update().await,
        };
        let Some(update) = next else {
            break;
        };
        match update {
            SessionUpdate::Sample(u) => {
                println!(
                    "  {:>6}%  {}  (smoothed {:.2} MB/s)",
                    u.display.percent_label(),
                    u.display.summary(),
                    u.smoothed_speed
                );
            }
            SessionUpdate::JobAccepted(ack) => {
                println!(
                    "Job accepted (task {})",
                    ack.task_id.as_deref().unwrap_or("-")
                );
                task_id = ack.task_id;
            }
            SessionUpdate::JobRejected(msg) => {
                session.reset();
                bail!("backend did not start the download: {msg}");
            }
            SessionUpdate::StreamEnded(_) => {}
        }
    }

    if opts.chart && !session.series().is_empty() {
        println!("Speed  {}", sparkline(session.series()));
    }

    match session.state() {
        SessionState::Terminated(outcome) if outcome.is_success() => {
            println!("{}", outcome.describe());
            Ok(task_id)
        }
        SessionState::Terminated(outcome) => bail!("{}", outcome.describe()),
        other => bail!("session stopped unexpectedly in state {other:?}"),
    }
}

/// One block character per value, scaled to the series maximum.
fn sparkline(series: &SmoothedSeries) -> String {
    let max = series.max().unwrap_or(0.0);
    series
        .iter()
        .map(|v| {
            if max <= 0.0 {
                return SPARK_LEVELS[0];
            }
            let top = (SPARK_LEVELS.len() - 1) as f64;
            let idx = ((v / max) * top).round().clamp(0.0, top) as usize;
            SPARK_LEVELS[idx]
        })
        .collect()
}
