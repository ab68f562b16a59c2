#[allow(dead_code)]
pub mod progress_server;
