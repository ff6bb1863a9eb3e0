//! Finished-video delivery
//!
//! - `range`: byte-range aware file sender
//! - `render`: on-demand encoder invocation over a snapshot folder

pub mod range;
pub mod render;

pub use range::{resolve_range, send_file, ByteRange, VIDEO_CONTENT_TYPE};
pub use render::RenderTrigger;

/// Extension of rendered timelapse files
pub const VIDEO_EXTENSION: &str = "mp4";
