/// Stream handlers - MJPEG endpoints backed by a per-connection session
use actix_web::{web, HttpResponse};

use crate::error::Result;
use crate::services::frames::FrameLocator;
use crate::services::streaming::{self, PlaybackMode, StreamingSession};
use crate::services::validate_camera_id;
use crate::AppState;

async fn open_stream(
    state: &AppState,
    camera: &str,
    frame_rate_hz: u32,
    mode: PlaybackMode,
) -> Result<HttpResponse> {
    let camera = validate_camera_id(camera)?;
    let locator = FrameLocator::LatestDateFolder(state.config.camera_snapshot_root(camera));
    let session = StreamingSession::open(camera, locator, frame_rate_hz, mode).await?;
    Ok(streaming::into_response(session, state.shutdown.child_token()))
}

/// Loop the latest snapshot day at the stream rate
pub async fn stream_camera(
    state: web::Data<AppState>,
    camera: web::Path<String>,
) -> Result<HttpResponse> {
    open_stream(&state, &camera, state.config.stream_fps, PlaybackMode::Looping).await
}

/// Loop the latest snapshot day at the live rate
pub async fn live_camera(
    state: web::Data<AppState>,
    camera: web::Path<String>,
) -> Result<HttpResponse> {
    open_stream(&state, &camera, state.config.live_fps, PlaybackMode::Looping).await
}

/// Play the latest snapshot day once, then end the response
pub async fn replay_camera(
    state: web::Data<AppState>,
    camera: web::Path<String>,
) -> Result<HttpResponse> {
    open_stream(&state, &camera, state.config.stream_fps, PlaybackMode::OneShot).await
}
