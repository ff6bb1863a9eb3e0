/// Configuration management for timelapse-service
///
/// Loads configuration from environment variables (and an optional `.env`
/// file) with sensible defaults. Every variable is optional.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Upper bound for any configured frame rate. Keeps the tick interval at or
/// above one millisecond.
pub const MAX_FRAME_RATE_HZ: u32 = 1000;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root holding one sub-folder of rendered `.mp4` files per camera.
    #[serde(default = "default_timelapse_folder")]
    pub timelapse_folder: PathBuf,
    /// Root holding `<camera>/<YYYYMMDD>/*.jpg` snapshot frames.
    #[serde(default = "default_snapshot_folder")]
    pub snapshot_folder: PathBuf,
    /// Where on-demand renders are written. Must not overlap the snapshot root.
    #[serde(default = "default_render_folder")]
    pub render_folder: PathBuf,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Cadence of `/api/stream` and `/api/replay`
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u32,
    /// Cadence of `/api/live`
    #[serde(default = "default_live_fps")]
    pub live_fps: u32,
    /// Frame rate passed to the encoder for downloads
    #[serde(default = "default_render_fps")]
    pub render_fps: u32,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_timelapse_folder() -> PathBuf {
    PathBuf::from("./timelapse")
}

fn default_snapshot_folder() -> PathBuf {
    PathBuf::from("./snapshots")
}

fn default_render_folder() -> PathBuf {
    PathBuf::from("./renders")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_stream_fps() -> u32 {
    30
}

fn default_live_fps() -> u32 {
    10
}

fn default_render_fps() -> u32 {
    30
}

fn default_render_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: Config =
            envy::from_env().map_err(|e| AppError::Config(format!("invalid environment: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from explicit key/value pairs, using the same
    /// names and defaults as the environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::from_iter(vars)
            .map_err(|e| AppError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, fps) in [
            ("STREAM_FPS", self.stream_fps),
            ("LIVE_FPS", self.live_fps),
            ("RENDER_FPS", self.render_fps),
        ] {
            if fps == 0 || fps > MAX_FRAME_RATE_HZ {
                return Err(AppError::Config(format!(
                    "{name} must be between 1 and {MAX_FRAME_RATE_HZ}, got {fps}"
                )));
            }
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(AppError::Config("FFMPEG_PATH must not be empty".into()));
        }
        if self.render_timeout_secs == 0 {
            return Err(AppError::Config("RENDER_TIMEOUT_SECS must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Folder of rendered videos for one camera
    pub fn camera_timelapse_root(&self, camera: &str) -> PathBuf {
        self.timelapse_folder.join(camera)
    }

    /// Folder of dated snapshot sub-folders for one camera
    pub fn camera_snapshot_root(&self, camera: &str) -> PathBuf {
        self.snapshot_folder.join(camera)
    }

    pub fn timelapse_root(&self) -> &Path {
        &self.timelapse_folder
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timelapse_folder: default_timelapse_folder(),
            snapshot_folder: default_snapshot_folder(),
            render_folder: default_render_folder(),
            ffmpeg_path: default_ffmpeg_path(),
            stream_fps: default_stream_fps(),
            live_fps: default_live_fps(),
            render_fps: default_render_fps(),
            render_timeout_secs: default_render_timeout_secs(),
        }
    }
}
