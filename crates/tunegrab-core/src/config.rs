use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::smoother::{DEFAULT_SMOOTHING_FACTOR, DEFAULT_WINDOW};

/// Speed chart parameters (optional `[chart]` section in config.toml).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// EMA weight given to the newest raw sample, in (0, 1].
    pub smoothing_factor: f64,
    /// Number of smoothed values kept for the chart.
    pub window: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            window: DEFAULT_WINDOW,
        }
    }
}

impl ChartConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            anyhow::bail!(
                "chart.smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            );
        }
        if self.window == 0 {
            anyhow::bail!("chart.window must be at least 1");
        }
        Ok(())
    }
}

/// Global configuration loaded from `~/.config/tunegrab/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunegrabConfig {
    /// Base URL of the download backend (e.g. "http://127.0.0.1:5000").
    pub server_url: String,
    /// Path of the server-push progress stream, relative to `server_url`.
    pub progress_path: String,
    /// Connect timeout for every request, including the progress stream.
    pub connect_timeout_secs: u64,
    /// Overall timeout for the JSON endpoints. The progress stream has none.
    pub request_timeout_secs: u64,
    /// Give up on a session after this many seconds without a stream event.
    /// Enforced by the caller; the session itself never times out.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// Optional chart tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub chart: Option<ChartConfig>,
}

impl Default for TunegrabConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            progress_path: "/progress".to_string(),
            connect_timeout_secs: 15,
            request_timeout_secs: 30,
            idle_timeout_secs: None,
            chart: None,
        }
    }
}

impl TunegrabConfig {
    /// Effective chart parameters.
    pub fn chart(&self) -> ChartConfig {
        self.chart.unwrap_or_default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Absolute URL of the progress stream.
    pub fn progress_endpoint(&self) -> Result<String> {
        join_endpoint(&self.server_url, &self.progress_path)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.server_url)
            .with_context(|| format!("invalid server_url: {}", self.server_url))?;
        self.chart().validate()
    }
}

/// Resolve `path` against `base` so that "/progress" on "http://h:1/app/"
/// becomes "http://h:1/progress" and "progress" becomes "http://h:1/app/progress".
pub fn join_endpoint(base: &str, path: &str) -> Result<String> {
    let base = url::Url::parse(base).with_context(|| format!("invalid base URL: {base}"))?;
    let joined = base
        .join(path)
        .with_context(|| format!("cannot join {path} onto {base}"))?;
    Ok(joined.into())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tunegrab")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TunegrabConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<TunegrabConfig> {
    if !path.exists() {
        let default_cfg = TunegrabConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: TunegrabConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
