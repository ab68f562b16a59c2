//! `tunegrab history`: finished downloads.

use anyhow::{Context, Result};
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;

pub async fn run_history(cfg: &TunegrabConfig) -> Result<()> {
    let client = BackendClient::from_config(cfg);
    let entries = tokio::task::spawn_blocking(move || client.history())
        .await
        .context("history request task")?
        .context("fetch history")?;

    if entries.is_empty() {
        println!("No downloads yet.");
        return Ok(());
    }
    println!("{:<20} {:<10} {}", "DATE", "SIZE (MB)", "TITLE");
    for e in entries {
        println!("{:<20} {:<10} {}", e.date, e.size_label(), e.title);
    }
    Ok(())
}
