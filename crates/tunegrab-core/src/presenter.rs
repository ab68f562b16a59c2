//! Derived display values for one progress sample (bar percentage and text).

use crate::sample::ProgressSample;

/// Label used when the total size is not known yet.
pub const UNKNOWN_LABEL: &str = "unknown";

/// What the progress bar and text line should show for a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    /// Bar fill in [0, 100]; 0 while the total is unknown.
    pub percent_complete: f64,
    /// MB still to transfer, `None` while the total is unknown.
    pub remaining: Option<f64>,
    pub downloaded_label: String,
    pub total_label: String,
    pub remaining_label: String,
    pub speed_label: String,
}

impl DisplayState {
    /// One-line progress text, e.g. "1.50 MB / 4.00 MB, remaining 2.50 MB, speed 0.80 MB/s".
    pub fn summary(&self) -> String {
        let remaining = match self.remaining {
            Some(_) => format!("{} MB", self.remaining_label),
            None => self.remaining_label.clone(),
        };
        format!(
            "{} MB / {} MB, remaining {}, speed {} MB/s",
            self.downloaded_label, self.total_label, remaining, self.speed_label
        )
    }

    /// Percentage formatted for display ("42.00").
    pub fn percent_label(&self) -> String {
        format!("{:.2}", self.percent_complete)
    }
}

/// Pure mapping from a raw sample to display values.
pub fn present(sample: &ProgressSample) -> DisplayState {
    let known_total = sample.total > 0.0;
    let percent_complete = if known_total {
        (sample.downloaded / sample.total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let remaining = known_total.then(|| (sample.total - sample.downloaded).max(0.0));

    DisplayState {
        percent_complete,
        remaining,
        downloaded_label: format!("{:.2}", sample.downloaded),
        total_label: format!("{:.2}", sample.total),
        remaining_label: remaining
            .map(|r| format!("{r:.2}"))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
        speed_label: format!("{:.2}", sample.speed),
    }
}
