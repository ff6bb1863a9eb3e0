//! HTTP handlers for Timelapse Service
//!
//! - MJPEG streams (looping, live, one-shot replay)
//! - Range-aware video delivery and rendered downloads
//! - Camera listing and the viewer page

pub mod cameras;
pub mod streams;
pub mod videos;

use actix_web::{web, HttpResponse};

use crate::metrics;

pub use cameras::{index, list_cameras};
pub use streams::{live_camera, replay_camera, stream_camera};
pub use videos::{camera_video, default_video, download_camera};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Route table shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .route("/video", web::get().to(default_video))
        .service(
            web::scope("/api")
                .route("/cameras", web::get().to(list_cameras))
                .route("/video/{camera}", web::get().to(camera_video))
                .route("/stream/{camera}", web::get().to(stream_camera))
                .route("/live/{camera}", web::get().to(live_camera))
                .route("/replay/{camera}", web::get().to(replay_camera))
                .route("/download/{camera}", web::get().to(download_camera)),
        );
}
