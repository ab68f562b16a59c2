//! Incremental `text/event-stream` framing.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines and
//! yields the `data` payload of every complete default ("message") event.
//! A line longer than [`MAX_LINE_BYTES`] poisons its event: the event is
//! dropped and counted instead of buffered.

/// Longest line kept in memory while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Stateful decoder for one event stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    data: String,
    event: String,
    /// Last byte was '\r'; a following '\n' belongs to the same line break.
    skip_lf: bool,
    seen_first_line: bool,
    /// Current line went past the limit; its bytes are being discarded.
    line_overflow: bool,
    /// Current event saw an oversized line and will not be dispatched.
    event_poisoned: bool,
    dropped: u64,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return payloads of events completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &b in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.skip_lf = true;
                }
                _ if self.line_overflow => {}
                _ if self.line.len() >= MAX_LINE_BYTES => {
                    self.line.clear();
                    self.line_overflow = true;
                }
                _ => self.line.push(b),
            }
        }
        out
    }

    /// Events dropped for oversized lines since the last call.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }

    fn end_line(&mut self, out: &mut Vec<String>) {
        let raw = std::mem::take(&mut self.line);
        if std::mem::take(&mut self.line_overflow) {
            self.seen_first_line = true;
            self.event_poisoned = true;
            return;
        }
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.seen_first_line {
            self.seen_first_line = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }
        self.process_line(line, out);
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = value.to_string(),
            // id/retry only matter for reconnection, which we never do.
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<String>) {
        let mut data = std::mem::take(&mut self.data);
        let event = std::mem::take(&mut self.event);
        if std::mem::take(&mut self.event_poisoned) {
            self.dropped += 1;
            return;
        }
        if data.is_empty() {
            return;
        }
        if data.ends_with('\n') {
            data.pop();
        }
        if event.is_empty() || event == "message" {
            out.push(data);
        } else {
            tracing::trace!(event = %event, "ignoring named stream event");
        }
    }
}
