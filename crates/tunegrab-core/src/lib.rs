//! Client side of a media download: trigger the backend job, follow its
//! progress stream, and turn the noisy speed signal into a chart series.

pub mod config;
pub mod error;
pub mod logging;

pub mod api;
pub mod presenter;
pub mod sample;
pub mod session;
pub mod smoother;
pub mod stream;
pub mod theme;
