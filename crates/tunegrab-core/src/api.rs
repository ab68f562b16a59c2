//! Blocking client for the backend's JSON and file endpoints.
//!
//! Uses the curl crate (libcurl). Every call runs in the current thread;
//! call from `spawn_blocking` if used from async code. The client is also
//! the production [`JobTrigger`] for sessions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str;
use std::time::Duration;

use crate::config::{join_endpoint, TunegrabConfig};
use crate::error::ApiError;
use crate::session::{JobResponse, JobTrigger};
use crate::stream::{is_success, parse_status_line};

/// Bytes of a failed response body kept for the error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Metadata returned by `POST /info`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Display duration ("mm:ss").
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Estimated output size in MB.
    #[serde(default, alias = "estimated_size_mb")]
    pub filesize: Option<f64>,
}

impl MediaInfo {
    /// Duration label, derived from `duration_seconds` when the backend sent no text.
    pub fn duration_label(&self) -> String {
        match (&self.duration, self.duration_seconds) {
            (Some(d), _) => d.clone(),
            (None, Some(secs)) => format_duration(secs),
            (None, None) => format_duration(0.0),
        }
    }
}

/// Acknowledgement of `POST /download`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobAck {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Snapshot returned by `GET /status/<task_id>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatusReport {
    pub status: String,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub downloaded_mb: f64,
    #[serde(default)]
    pub total_mb: Option<f64>,
    #[serde(default)]
    pub speed_kb_s: f64,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One finished download listed by `GET /history`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub title: String,
    /// Size in MB; some backends send it as text.
    #[serde(default)]
    pub size: serde_json::Value,
    #[serde(default)]
    pub date: String,
}

impl HistoryEntry {
    pub fn size_label(&self) -> String {
        match &self.size {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) => format!("{v:.2}"),
                None => n.to_string(),
            },
            serde_json::Value::String(s) => s.clone(),
            _ => "?".to_string(),
        }
    }
}

/// A response body saved to disk by [`BackendClient::fetch_file`] or
/// [`BackendClient::fetch_preview`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Serialize)]
struct UrlRequest<'a> {
    url: &'a str,
}

/// Seconds -> "mm:ss"; negative or non-finite input gives "00:00".
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "00:00".to_string();
    }
    let secs = secs.trunc() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Client for the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &TunegrabConfig) -> Self {
        Self::new(
            cfg.server_url.clone(),
            cfg.connect_timeout(),
            cfg.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /info`: title, thumbnail, duration and estimated size.
    pub fn fetch_info(&self, url: &str) -> Result<MediaInfo, ApiError> {
        let url = non_empty(url)?;
        self.post_json("/info", &UrlRequest { url })
    }

    /// `POST /download`: ask the backend to start the job.
    pub fn trigger_download(&self, url: &str) -> Result<JobAck, ApiError> {
        let url = non_empty(url)?;
        let ack: JobAck = self.post_json("/download", &UrlRequest { url })?;
        tracing::info!(task_id = ?ack.task_id, "download job accepted");
        Ok(ack)
    }

    /// `GET /status/<task_id>`.
    pub fn job_status(&self, task_id: &str) -> Result<JobStatusReport, ApiError> {
        let task_id = valid_task_id(task_id)?;
        self.get_json(&format!("/status/{task_id}"))
    }

    /// `GET /file/<task_id>`: save the finished audio file.
    ///
    /// If `dest` is an existing directory the file is named after the
    /// backend's `Content-Disposition` (falling back to `<task_id>.mp3`);
    /// otherwise `dest` is the file path. The backend answers 404 until the
    /// job has finished.
    pub fn fetch_file(&self, task_id: &str, dest: &Path) -> Result<SavedFile, ApiError> {
        let task_id = valid_task_id(task_id)?;
        self.save_body(&format!("/file/{task_id}"), None, dest, &format!("{task_id}.mp3"))
    }

    /// `POST /preview`: save a short audio preview of `url`.
    pub fn fetch_preview(&self, url: &str, dest: &Path) -> Result<SavedFile, ApiError> {
        let url = non_empty(url)?;
        let payload = serde_json::to_vec(&UrlRequest { url })?;
        self.save_body("/preview", Some(&payload), dest, "preview.mp3")
    }

    /// `GET /history`.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        self.get_json("/history")
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (code, body) = self.request(path, None)?;
        decode_response(code, &body)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let payload = serde_json::to_vec(body)?;
        let (code, body) = self.request(path, Some(&payload))?;
        decode_response(code, &body)
    }

    fn endpoint(&self, path: &str) -> Result<String, ApiError> {
        join_endpoint(&self.base_url, path).map_err(|e| ApiError::Endpoint(format!("{e:#}")))
    }

    /// Handle with the shared options; POSTs `json_body` when given.
    fn easy(&self, endpoint: &str, accept: &str, json_body: Option<&[u8]>) -> Result<curl::easy::Easy, ApiError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(endpoint)?;
        easy.follow_location(true)?;
        easy.connect_timeout(self.connect_timeout)?;

        let mut list = curl::easy::List::new();
        list.append(&format!("Accept: {accept}"))?;
        if let Some(payload) = json_body {
            list.append("Content-Type: application/json")?;
            easy.post(true)?;
            easy.post_fields_copy(payload)?;
        }
        easy.http_headers(list)?;
        Ok(easy)
    }

    /// Perform one request and return (status, body).
    fn request(&self, path: &str, json_body: Option<&[u8]>) -> Result<(u32, Vec<u8>), ApiError> {
        let endpoint = self.endpoint(path)?;
        let mut body = Vec::new();

        let mut easy = self.easy(&endpoint, "application/json", json_body)?;
        easy.timeout(self.request_timeout)?;

        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        tracing::debug!(endpoint = %endpoint, code, bytes = body.len(), "backend request done");
        Ok((code, body))
    }

    /// Stream a response body into `<dir>/.<fallback>.part`, then rename it
    /// into place. Nothing is left behind on failure.
    fn save_body(
        &self,
        path: &str,
        json_body: Option<&[u8]>,
        dest: &Path,
        fallback_name: &str,
    ) -> Result<SavedFile, ApiError> {
        let endpoint = self.endpoint(path)?;
        let into_dir = dest.is_dir();
        let dir = if into_dir {
            dest.to_path_buf()
        } else {
            match dest.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            }
        };
        let part = dir.join(format!(".{fallback_name}.part"));

        let saved = self.transfer_to(&endpoint, json_body, &part);
        let (bytes, suggested) = match saved {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(e);
            }
        };

        let target = if into_dir {
            dest.join(suggested.as_deref().unwrap_or(fallback_name))
        } else {
            dest.to_path_buf()
        };
        if let Err(e) = fs::rename(&part, &target) {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }
        tracing::info!(endpoint = %endpoint, path = %target.display(), bytes, "saved response body");
        Ok(SavedFile { path: target, bytes })
    }

    /// Returns (bytes written, file name suggested by the server).
    fn transfer_to(
        &self,
        endpoint: &str,
        json_body: Option<&[u8]>,
        part: &Path,
    ) -> Result<(u64, Option<String>), ApiError> {
        let mut file = fs::File::create(part)?;
        let mut easy = self.easy(endpoint, "*/*", json_body)?;
        // Audio files can take a while: give up on stalls, not on total time.
        easy.low_speed_limit(1)?;
        easy.low_speed_time(self.request_timeout)?;

        let status: Cell<Option<u32>> = Cell::new(None);
        let suggested: RefCell<Option<String>> = RefCell::new(None);
        let mut write_error: Option<std::io::Error> = None;
        let mut error_body = Vec::new();
        let mut written = 0u64;

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    if let Some(code) = parse_status_line(line) {
                        status.set(Some(code));
                        *suggested.borrow_mut() = None;
                    } else if let Some(name) = attachment_name(line) {
                        *suggested.borrow_mut() = Some(name);
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                if !status.get().map_or(false, is_success) {
                    let room = ERROR_BODY_LIMIT.saturating_sub(error_body.len());
                    error_body.extend_from_slice(&data[..data.len().min(room)]);
                    return Ok(data.len());
                }
                match file.write_all(data) {
                    Ok(()) => {
                        written += data.len() as u64;
                        Ok(data.len())
                    }
                    Err(e) => {
                        write_error = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };

        if let Some(e) = write_error {
            return Err(e.into());
        }
        performed?;
        let code = easy.response_code()?;
        if !is_success(code) {
            return Err(decode_response::<serde_json::Value>(code, &error_body)
                .err()
                .unwrap_or(ApiError::Http {
                    code,
                    message: String::new(),
                }));
        }
        file.flush()?;
        Ok((written, suggested.into_inner()))
    }
}

fn valid_task_id(task_id: &str) -> Result<&str, ApiError> {
    let task_id = task_id.trim();
    if task_id.is_empty() || task_id.contains('/') {
        return Err(ApiError::Endpoint(format!("invalid task id {task_id:?}")));
    }
    Ok(task_id)
}

/// `Content-Disposition: attachment; filename="Song.mp3"` -> "Song.mp3".
/// Directory parts are stripped so the name cannot escape the target dir.
fn attachment_name(line: &str) -> Option<String> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-disposition") {
        return None;
    }
    let raw = value.split(';').find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| val.trim().trim_matches('"').to_string())
    })?;
    let file = Path::new(&raw).file_name()?.to_str()?;
    if file.is_empty() || file.starts_with('.') {
        return None;
    }
    Some(file.to_string())
}

fn non_empty(url: &str) -> Result<&str, ApiError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ApiError::EmptyUrl);
    }
    Ok(url)
}

/// Map status + body onto `T`, honouring the backend's `{"ok": false, "error": ..}` envelope.
fn decode_response<T: DeserializeOwned>(code: u32, body: &[u8]) -> Result<T, ApiError> {
    let parsed: Result<serde_json::Value, _> = serde_json::from_slice(body);
    let backend_error = parsed.as_ref().ok().and_then(|v| {
        let rejected = v.get("ok").and_then(|ok| ok.as_bool()) == Some(false);
        let message = v.get("error").and_then(|e| e.as_str()).map(str::to_string);
        match (rejected, message) {
            (true, Some(m)) => Some(m),
            (true, None) => Some("request failed".to_string()),
            (false, _) => None,
        }
    });

    if !(200..300).contains(&code) {
        let message = backend_error
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().chars().take(200).collect());
        return Err(ApiError::Http { code, message });
    }
    if let Some(message) = backend_error {
        return Err(ApiError::Rejected(message));
    }
    Ok(serde_json::from_value(parsed?)?)
}

impl JobTrigger for BackendClient {
    fn trigger(&self, url: &str) -> tokio::task::JoinHandle<JobResponse> {
        let client = self.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || client.trigger_download(&url))
    }
}
