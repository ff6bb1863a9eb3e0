//! Timelapse Service
//!
//! Serves camera snapshot folders as live MJPEG streams and pre-rendered
//! timelapse videos with byte-range support.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod services;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use services::video::RenderTrigger;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};

/// Shared state handed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub renderer: Arc<RenderTrigger>,
    /// Cancelled on shutdown so long-lived streaming sessions let go of
    /// their connections.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let renderer = RenderTrigger::from_config(&config);
        Self {
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            shutdown: CancellationToken::new(),
        }
    }
}
