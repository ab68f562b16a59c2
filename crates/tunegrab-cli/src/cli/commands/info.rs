//! `tunegrab info <url>`: media metadata from the backend.

use anyhow::{Context, Result};
use tunegrab_core::api::BackendClient;
use tunegrab_core::config::TunegrabConfig;

pub async fn run_info(cfg: &TunegrabConfig, url: String) -> Result<()> {
    let client = BackendClient::from_config(cfg);
    let info = tokio::task::spawn_blocking(move || client.fetch_info(&url))
        .await
        .context("info request task")?
        .context("fetch media info")?;

    println!("Title:     {}", info.title.as_deref().unwrap_or("Unknown title"));
    println!("Duration:  {}", info.duration_label());
    match info.filesize {
        Some(mb) => println!("Size:      ~{mb:.2} MB"),
        None => println!("Size:      unknown"),
    }
    if let Some(thumb) = info.thumbnail.as_deref().filter(|t| !t.is_empty()) {
        println!("Thumbnail: {thumb}");
    }
    Ok(())
}
