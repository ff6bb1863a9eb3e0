/// Camera handlers - discovery endpoint and the viewer page
use actix_web::{web, HttpResponse};

use crate::error::Result;
use crate::services;
use crate::AppState;

pub async fn list_cameras(state: web::Data<AppState>) -> Result<HttpResponse> {
    let cameras = services::list_cameras(state.config.timelapse_root()).await?;
    Ok(HttpResponse::Ok().json(cameras))
}

/// Viewer page with a live stream and the latest video per camera.
/// Listed ids are restricted to `[A-Za-z0-9._-]`, so they are safe to
/// interpolate as-is.
pub async fn index(state: web::Data<AppState>) -> Result<HttpResponse> {
    let cameras = services::list_cameras(state.config.timelapse_root()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_index(&cameras)))
}

fn render_index(cameras: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Timelapse</title>\n</head>\n<body>\n<h1>Timelapse</h1>\n",
    );
    if cameras.is_empty() {
        html.push_str("<p>No cameras found.</p>\n");
    }
    for camera in cameras {
        html.push_str(&format!(
            "<section>\n<h2>{camera}</h2>\n\
             <img src=\"/api/live/{camera}\" alt=\"{camera} live\">\n\
             <video src=\"/api/video/{camera}\" controls></video>\n\
             <p><a href=\"/api/download/{camera}\">Download today's timelapse</a></p>\n\
             </section>\n"
        ));
    }
    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_index_links_each_camera() {
        let html = render_index(&["driveway".to_string(), "porch".to_string()]);
        assert!(html.contains("<img src=\"/api/live/driveway\""));
        assert!(html.contains("<video src=\"/api/video/porch\""));
        assert!(html.contains("/api/download/porch"));
        assert!(!html.contains("No cameras found"));
    }

    #[test]
    fn test_render_index_without_cameras() {
        assert!(render_index(&[]).contains("No cameras found."));
    }
}
