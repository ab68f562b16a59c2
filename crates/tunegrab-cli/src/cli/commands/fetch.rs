//! `tunegrab fetch <task_id>`: save a finished job's file.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;

pub async fn run_fetch(cfg: &TunegrabConfig, task_id: String, dest: PathBuf) -> Result<()> {
    let client = BackendClient::from_config(cfg);
    let saved = tokio::task::spawn_blocking(move || client.fetch_file(&task_id, &dest))
        .await
        .context("file request task")?
        .context("fetch finished file")?;
    println!("Saved {} ({} bytes)", saved.path.display(), saved.bytes);
    Ok(())
}
