//! MJPEG streaming
//!
//! - `session`: per-connection playback state and the timer-driven loop
//! - `multipart`: wire framing of each emitted JPEG

pub mod multipart;
pub mod session;

use actix_web::{http::header, HttpResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

pub use session::{
    frame_interval, CloseReason, FrameSink, PlaybackMode, SessionReport, SessionState,
    StreamingSession, FRAME_BUFFER,
};

/// Commits the multipart response headers and hands the connection to the
/// session. The session runs on its own task and ends on exhaustion, client
/// disconnect, or when `shutdown` is cancelled.
pub fn into_response(session: StreamingSession, shutdown: CancellationToken) -> HttpResponse {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);

    actix_web::rt::spawn(async move {
        session.run(tx, shutdown).await;
    });

    HttpResponse::Ok()
        .content_type(multipart::CONTENT_TYPE)
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(ReceiverStream::new(rx))
}
