//! `tunegrab status <task_id>`: one job's state as the backend sees it.

use anyhow::{Context, Result};
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;

pub async fn run_status(cfg: &TunegrabConfig, task_id: String) -> Result<()> {
    let client = BackendClient::from_config(cfg);
    let report = tokio::task::spawn_blocking(move || client.job_status(&task_id))
        .await
        .context("status request task")?
        .context("fetch job status")?;

    let percent = report
        .percent
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| "-".to_string());
    let total = report
        .total_mb
        .map(|t| format!("{t:.2}"))
        .unwrap_or_else(|| "?".to_string());
    println!("{:<12} {}", "STATE", report.status);
    println!("{:<12} {}", "PROGRESS", percent);
    println!(
        "{:<12} {:.2} / {} MB",
        "DOWNLOADED", report.downloaded_mb, total
    );
    println!("{:<12} {:.1} KB/s", "SPEED", report.speed_kb_s);
    if let Some(eta) = report.eta {
        println!("{:<12} {:.0}s", "ETA", eta);
    }
    if let Some(file) = report.file.as_deref() {
        println!("{:<12} {}", "FILE", file);
    }
    if let Some(err) = report.error.as_deref() {
        println!("{:<12} {}", "ERROR", err);
    }
    Ok(())
}
