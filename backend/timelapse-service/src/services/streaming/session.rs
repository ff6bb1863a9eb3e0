//! Per-connection MJPEG streaming session
//!
//! A session owns its cursor, its snapshot of the frame list and the timer
//! that paces emission. Frames are pushed into a bounded channel whose
//! receiving half is the HTTP response body; when the client goes away the
//! body (and so the receiver) is dropped, which the session observes between
//! ticks and treats as a disconnect.
//!
//! Lifecycle: `Open -> Emitting -> (Exhausted | Disconnected) -> Closed`.
//! Every exit path funnels through [`StreamingSession::close`], which runs
//! its side effects exactly once.

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::multipart;
use crate::config::MAX_FRAME_RATE_HZ;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::frames::{FrameLocator, FrameSource};

/// Sending half of a streaming response body
pub type FrameSink = mpsc::Sender<std::result::Result<Bytes, io::Error>>;

/// Parts buffered between the session and the response body
pub const FRAME_BUFFER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Stop after the last frame
    OneShot,
    /// Restart from the first frame, re-reading the folder from storage
    Looping,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackMode::OneShot => "one_shot",
            PlaybackMode::Looping => "looping",
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Emitting,
    Exhausted,
    Disconnected,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// One-shot playback reached the end
    Exhausted,
    /// Looping playback re-resolved to nothing
    SourceVanished,
    /// The client went away
    Disconnected,
    /// Server is shutting down
    Shutdown,
    /// Dropped without running to completion
    Aborted,
}

impl CloseReason {
    fn terminal_state(&self) -> SessionState {
        match self {
            CloseReason::Exhausted | CloseReason::SourceVanished => SessionState::Exhausted,
            CloseReason::Disconnected | CloseReason::Shutdown | CloseReason::Aborted => {
                SessionState::Disconnected
            }
        }
    }
}

/// What a finished session did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_sent: u64,
    pub frames_skipped: u64,
    pub loops: u64,
    pub reason: Option<CloseReason>,
}

/// Converts a frame rate into the tick period (1000 / hz milliseconds).
pub fn frame_interval(frame_rate_hz: u32) -> Result<Duration> {
    if frame_rate_hz == 0 || frame_rate_hz > MAX_FRAME_RATE_HZ {
        return Err(AppError::Config(format!(
            "frame rate must be between 1 and {MAX_FRAME_RATE_HZ} Hz, got {frame_rate_hz}"
        )));
    }
    Ok(Duration::from_micros(1_000_000 / u64::from(frame_rate_hz)))
}

pub struct StreamingSession {
    label: String,
    locator: FrameLocator,
    source: FrameSource,
    cursor: usize,
    frame_interval: Duration,
    mode: PlaybackMode,
    state: SessionState,
    report: SessionReport,
}

impl StreamingSession {
    /// Resolves the frame source and prepares a session.
    ///
    /// Fails with `NotFound` before anything is committed to the client if
    /// the folder is missing or holds no frames.
    pub async fn open(
        label: impl Into<String>,
        locator: FrameLocator,
        frame_rate_hz: u32,
        mode: PlaybackMode,
    ) -> Result<Self> {
        let label = label.into();
        let frame_interval = frame_interval(frame_rate_hz)?;
        let source = locator.resolve().await.map_err(|err| {
            info!(session = %label, error = %err, "Streaming session rejected");
            AppError::no_frames_for(&label)
        })?;

        info!(
            session = %label,
            folder = %source.folder.display(),
            frames = source.len(),
            mode = %mode,
            interval_ms = frame_interval.as_millis() as u64,
            "Streaming session opened"
        );
        metrics::session_opened(mode.as_str());

        Ok(Self {
            label,
            locator,
            source,
            cursor: 0,
            frame_interval,
            mode,
            state: SessionState::Open,
            report: SessionReport::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// Drives the emission loop until the frames run out, the client
    /// disconnects or `shutdown` fires. The timer lives only inside this
    /// call, so it is released on every exit path.
    pub async fn run(mut self, sink: FrameSink, shutdown: CancellationToken) -> SessionReport {
        self.state = SessionState::Emitting;

        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break CloseReason::Shutdown,
                _ = sink.closed() => break CloseReason::Disconnected,
                _ = ticker.tick() => {
                    if let Some(reason) = self.tick(&sink, &shutdown).await {
                        break reason;
                    }
                }
            }
        };

        self.close(reason);
        self.report.clone()
    }

    /// One timer tick: either loop/finish, or emit (or skip) one frame.
    async fn tick(&mut self, sink: &FrameSink, shutdown: &CancellationToken) -> Option<CloseReason> {
        if self.cursor >= self.source.len() {
            return match self.mode {
                PlaybackMode::OneShot => Some(CloseReason::Exhausted),
                PlaybackMode::Looping => self.loop_back().await,
            };
        }

        let index = self.cursor;
        self.cursor += 1;
        let Some(path) = self.source.get(index) else {
            return None;
        };

        let jpeg = match fs::read(path).await {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!(
                    session = %self.label,
                    frame = %path.display(),
                    cursor = index,
                    error = %err,
                    "Skipping unreadable frame"
                );
                self.report.frames_skipped += 1;
                metrics::frame_skipped();
                return None;
            }
        };

        let part = multipart::encode_frame(&jpeg);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Some(CloseReason::Shutdown),
            sent = sink.send(Ok(part)) => match sent {
                Ok(()) => {
                    self.report.frames_sent += 1;
                    metrics::frame_emitted();
                    None
                }
                Err(_) => Some(CloseReason::Disconnected),
            },
        }
    }

    /// Rewinds and rebuilds the frame list from storage so frames written
    /// since the last pass become visible.
    async fn loop_back(&mut self) -> Option<CloseReason> {
        self.cursor = 0;
        match self.locator.resolve().await {
            Ok(source) => {
                debug!(
                    session = %self.label,
                    folder = %source.folder.display(),
                    frames = source.len(),
                    "Frame source re-resolved"
                );
                self.source = source;
                self.report.loops += 1;
                None
            }
            Err(err) => {
                warn!(session = %self.label, error = %err, "Frame source vanished while looping");
                self.source.frames.clear();
                Some(CloseReason::SourceVanished)
            }
        }
    }

    /// Single teardown path. Returns `false` if the session was already
    /// closed.
    fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = reason.terminal_state();
        self.report.reason = Some(reason);
        metrics::session_closed(self.mode.as_str());

        match reason {
            CloseReason::Disconnected | CloseReason::Shutdown => debug!(
                session = %self.label,
                reason = ?reason,
                frames_sent = self.report.frames_sent,
                "Streaming stopped"
            ),
            _ => info!(
                session = %self.label,
                reason = ?reason,
                frames_sent = self.report.frames_sent,
                frames_skipped = self.report.frames_skipped,
                loops = self.report.loops,
                "Streaming session closed"
            ),
        }

        self.state = SessionState::Closed;
        true
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close(CloseReason::Aborted);
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("label", &self.label)
            .field("folder", &self.source.folder)
            .field("frames", &self.source.len())
            .field("cursor", &self.cursor)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}
