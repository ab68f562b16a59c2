//! Minimal HTTP/1.1 stand-in for the download backend, for integration tests.
//!
//! Serves `GET /progress` as an event stream of scripted frames, answers
//! the JSON endpoints (`/download`, `/info`, `/history`, `/status/<id>`)
//! with canned bodies and serves audio from `/file/<id>` and `/preview`.
//! Every request is recorded.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BackendScript {
    /// Raw event-stream text written to `/progress`, one chunk at a time.
    pub frames: Vec<String>,
    /// Pause between chunks.
    pub frame_delay: Duration,
    /// Keep `/progress` open after the last chunk (sending keep-alive comments)
    /// until the client goes away.
    pub hold_open: bool,
    pub download_status: u16,
    pub download_body: String,
    pub info_body: String,
    pub history_body: String,
    pub status_body: String,
    /// `GET /file/<finished_task>` serves `file_body`; other ids get 404.
    pub finished_task: Option<String>,
    pub file_body: Vec<u8>,
    pub preview_body: Vec<u8>,
}

impl Default for BackendScript {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            frame_delay: Duration::from_millis(20),
            hold_open: false,
            download_status: 200,
            download_body: r#"{"ok": true, "task_id": "job-1"}"#.to_string(),
            info_body: r#"{"ok": true, "title": "Song", "thumbnail": "http://t/x.jpg", "duration_seconds": 185, "duration": "03:05", "estimated_size_mb": 2.83}"#.to_string(),
            history_body: r#"[{"title": "Old song", "size": 3.5, "date": "2024-01-02 10:00"}]"#.to_string(),
            status_body: r#"{"status": "downloading", "percent": 42.0, "downloaded_mb": 1.2, "total_mb": 2.83, "speed_kb_s": 512.0}"#.to_string(),
            finished_task: Some("job-1".to_string()),
            file_body: (0u8..=255).cycle().take(48 * 1024).collect(),
            preview_body: b"ID3 preview".to_vec(),
        }
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub struct Backend {
    /// Base URL without a trailing slash, e.g. "http://127.0.0.1:12345".
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    pub fn progress_url(&self) -> String {
        format!("{}/progress", self.base_url)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Poll until a request matching `method` and `path` has been seen.
    pub fn wait_for(&self, method: &str, path: &str, limit: Duration) -> Option<Recorded> {
        let deadline = Instant::now() + limit;
        loop {
            let found = self
                .requests()
                .into_iter()
                .find(|r| r.method == method && r.path == path);
            if found.is_some() || Instant::now() >= deadline {
                return found;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// One `data:` frame carrying `json`.
pub fn frame(json: &str) -> String {
    format!("data: {json}\n\n")
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(script: BackendScript) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let script = Arc::new(script);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let script = Arc::clone(&script);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &script, &log));
        }
    });
    Backend {
        base_url: format!("http://127.0.0.1:{port}"),
        requests,
    }
}

/// A local port with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/progress")
}

fn handle(mut stream: TcpStream, script: &BackendScript, log: &Mutex<Vec<Recorded>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    log.lock().unwrap().push(request.clone());

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/progress") => serve_progress(stream, script),
        ("POST", "/download") => {
            respond_json(&mut stream, script.download_status, &script.download_body)
        }
        ("POST", "/info") => respond_json(&mut stream, 200, &script.info_body),
        ("GET", "/history") => respond_json(&mut stream, 200, &script.history_body),
        ("GET", p) if p.starts_with("/status/") => {
            respond_json(&mut stream, 200, &script.status_body)
        }
        ("GET", p) if p.starts_with("/file/") => {
            let id = &p["/file/".len()..];
            if script.finished_task.as_deref() == Some(id) {
                let disposition = format!("attachment; filename=\"{id}.mp3\"");
                respond_audio(&mut stream, &script.file_body, Some(&disposition));
            } else {
                respond_json(&mut stream, 404, r#"{"ok": false, "error": "not ready"}"#);
            }
        }
        ("POST", "/preview") => respond_audio(&mut stream, &script.preview_body, None),
        _ => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    }
}

fn serve_progress(mut stream: TcpStream, script: &BackendScript) {
    // No Content-Length: the body runs until the connection closes.
    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\nConnection: close\r\n\r\n";
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in &script.frames {
        if stream.write_all(chunk.as_bytes()).is_err() || stream.flush().is_err() {
            return;
        }
        thread::sleep(script.frame_delay);
    }
    if script.hold_open {
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
            if stream.write_all(b": keep-alive\n\n").is_err() || stream.flush().is_err() {
                return;
            }
        }
    }
}

fn respond_json(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = if status < 300 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

fn respond_audio(stream: &mut TcpStream, body: &[u8], disposition: Option<&str>) {
    let disposition = disposition
        .map(|d| format!("Content-Disposition: {d}\r\n"))
        .unwrap_or_default();
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\n{disposition}\
Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

/// Reads the head and, when Content-Length says so, the body.
fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = std::str::from_utf8(&buf[..head_end]).ok()?.to_string();
    let (method, path, content_length) = parse_head(&head);
    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(head_end + content_length);
    Some(Recorded {
        method,
        path,
        body: String::from_utf8_lossy(&buf[head_end..body_end]).into_owned(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Returns (method, path, content length).
fn parse_head(head: &str) -> (String, String, usize) {
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();
    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    (method, path, content_length)
}
