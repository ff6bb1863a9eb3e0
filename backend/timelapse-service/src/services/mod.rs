//! Service Layer for Timelapse Service
//!
//! - Frame source resolution over the snapshot tree
//! - Per-connection MJPEG streaming sessions
//! - Camera discovery
//! - Range-aware video delivery and on-demand rendering

pub mod cameras;
pub mod frames;
pub mod streaming;
pub mod video;

// Re-export commonly used types
pub use cameras::{is_valid_camera_id, list_cameras, validate_camera_id};
pub use frames::{FrameLocator, FrameSource, FrameSourceError};
pub use streaming::{PlaybackMode, StreamingSession};
pub use video::RenderTrigger;
