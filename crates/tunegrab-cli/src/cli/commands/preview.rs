//! `tunegrab preview <url>`: save a short audio clip to listen to first.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;

pub async fn run_preview(cfg: &TunegrabConfig, url: String, dest: PathBuf) -> Result<()> {
    let client = BackendClient::from_config(cfg);
    let saved = tokio::task::spawn_blocking(move || client.fetch_preview(&url, &dest))
        .await
        .context("preview request task")?
        .context("fetch preview")?;
    println!("Preview saved to {}", saved.path.display());
    Ok(())
}
