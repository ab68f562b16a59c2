//! CLI command handlers, one file per command.

mod completions;
mod download;
mod fetch;
mod history;
mod info;
mod manpage;
mod preview;
mod status;

pub use completions::run_completions;
pub use download::{run_download, DownloadOptions};
pub use fetch::run_fetch;
pub use history::run_history;
pub use info::run_info;
pub use manpage::run_manpage;
pub use preview::run_preview;
pub use status::run_status;
