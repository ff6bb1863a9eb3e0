/// Video handlers - pre-rendered files and on-demand renders
use std::path::Path;

use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::services::frames::{self, latest_file_with_extension};
use crate::services::validate_camera_id;
use crate::services::video::{send_file, VIDEO_EXTENSION};
use crate::AppState;

async fn send_latest_video(req: &HttpRequest, folder: &Path, owner: &str) -> Result<HttpResponse> {
    let video = latest_file_with_extension(folder, VIDEO_EXTENSION)
        .await
        .ok_or_else(|| {
            debug!(folder = %folder.display(), "No video to send");
            AppError::NotFound(format!("no video for {owner}"))
        })?;
    send_file(req, &video, None).await
}

/// Latest video directly under the timelapse root
pub async fn default_video(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    send_latest_video(&req, state.config.timelapse_root(), "the default camera").await
}

/// Latest video of one camera
pub async fn camera_video(
    req: HttpRequest,
    state: web::Data<AppState>,
    camera: web::Path<String>,
) -> Result<HttpResponse> {
    let camera = validate_camera_id(&camera)?;
    let owner = format!("camera '{camera}'");
    send_latest_video(&req, &state.config.camera_timelapse_root(camera), &owner).await
}

/// Render the latest snapshot day and send it as an attachment
pub async fn download_camera(
    req: HttpRequest,
    state: web::Data<AppState>,
    camera: web::Path<String>,
) -> Result<HttpResponse> {
    let camera = validate_camera_id(&camera)?;
    let folder = frames::resolve_latest_date_folder(&state.config.camera_snapshot_root(camera))
        .await
        .map_err(|err| {
            info!(camera = %camera, error = %err, "Nothing to download");
            AppError::no_frames_for(camera)
        })?;
    let date = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let output = state.renderer.render(camera, &folder).await?;
    let download_name = format!("{camera}_{date}.mp4");
    info!(camera = %camera, file = %download_name, "Sending rendered timelapse");
    send_file(&req, &output, Some(&download_name)).await
}
