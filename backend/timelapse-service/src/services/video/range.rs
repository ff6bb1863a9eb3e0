/// Range-aware file sender
///
/// Serves finished video files with `Accept-Ranges: bytes` so players can
/// seek. Only the first range of a multi-range request is honoured.
use std::io::SeekFrom;
use std::path::Path;

use actix_web::body::SizedStream;
use actix_web::http::header::{self, ByteRangeSpec, Range};
use actix_web::{HttpRequest, HttpResponse};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{AppError, Result};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Inclusive byte range within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `Content-Range` value, e.g. `bytes 0-99/1000`
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Interprets a `Range` header value against a file of `total` bytes.
///
/// `Ok(None)` means no header, i.e. serve the whole file. Malformed or
/// unsatisfiable values are rejected rather than guessed at.
pub fn resolve_range(raw: Option<&str>, total: u64) -> Result<Option<ByteRange>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    if total == 0 {
        return Err(AppError::RangeNotSatisfiable { total });
    }

    let spec: ByteRangeSpec = match raw.trim().parse::<Range>() {
        Ok(Range::Bytes(specs)) => specs
            .into_iter()
            .next()
            .ok_or(AppError::RangeNotSatisfiable { total })?,
        Ok(Range::Unregistered(unit, _)) => {
            debug!(%unit, "Unsupported range unit");
            return Err(AppError::RangeNotSatisfiable { total });
        }
        Err(_) => {
            debug!(range = %raw, "Malformed range header");
            return Err(AppError::RangeNotSatisfiable { total });
        }
    };

    spec.to_satisfiable_range(total)
        .map(|(start, end)| Some(ByteRange { start, end }))
        .ok_or(AppError::RangeNotSatisfiable { total })
}

/// Streams `path` as `video/mp4`, honouring an optional `Range` header.
/// With `download_name` the response is marked as an attachment.
pub async fn send_file(
    req: &HttpRequest,
    path: &Path,
    download_name: Option<&str>,
) -> Result<HttpResponse> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %path.display(), "Video file missing");
            return Err(AppError::NotFound("video not found".into()));
        }
        Err(err) => return Err(err.into()),
    };
    let total = file.metadata().await?.len();

    let raw_range = match req.headers().get(header::RANGE) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::RangeNotSatisfiable { total })?,
        ),
        None => None,
    };
    let range = resolve_range(raw_range, total)?;

    let mut builder = match range {
        Some(range) => {
            let mut builder = HttpResponse::PartialContent();
            builder.insert_header((header::CONTENT_RANGE, range.content_range(total)));
            builder
        }
        None => HttpResponse::Ok(),
    };
    builder
        .content_type(VIDEO_CONTENT_TYPE)
        .insert_header((header::ACCEPT_RANGES, "bytes"));
    if let Some(name) = download_name {
        builder.insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ));
    }

    let (start, len) = range.map(|r| (r.start, r.len())).unwrap_or((0, total));
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    debug!(file = %path.display(), start, len, total, "Sending video");

    let body = SizedStream::new(len, ReaderStream::new(file.take(len)));
    Ok(builder.body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use tempfile::TempDir;

    fn video_file(dir: &TempDir, size: usize) -> std::path::PathBuf {
        let path = dir.path().join("clip.mp4");
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_resolve_range_variants() {
        assert_eq!(resolve_range(None, 1000).unwrap(), None);
        assert_eq!(
            resolve_range(Some("bytes=0-99"), 1000).unwrap(),
            Some(ByteRange { start: 0, end: 99 })
        );
        assert_eq!(
            resolve_range(Some("bytes=900-"), 1000).unwrap(),
            Some(ByteRange { start: 900, end: 999 })
        );
        assert_eq!(
            resolve_range(Some("bytes=-100"), 1000).unwrap(),
            Some(ByteRange { start: 900, end: 999 })
        );
        // End past EOF is clamped
        assert_eq!(
            resolve_range(Some("bytes=500-5000"), 1000).unwrap(),
            Some(ByteRange { start: 500, end: 999 })
        );
    }

    #[test]
    fn test_resolve_range_rejects_bad_values() {
        for raw in ["bytes=1000-", "bytes=50-10", "bytes=abc", "pages=1-2", "bytes="] {
            let err = resolve_range(Some(raw), 1000).unwrap_err();
            assert!(
                matches!(err, AppError::RangeNotSatisfiable { total: 1000 }),
                "{raw} should be rejected"
            );
        }
        assert!(resolve_range(Some("bytes=0-0"), 0).is_err());
    }

    #[actix_web::test]
    async fn test_partial_content_slice() {
        let dir = TempDir::new().unwrap();
        let path = video_file(&dir, 1000);
        let req = TestRequest::default()
            .insert_header((header::RANGE, "bytes=0-99"))
            .to_http_request();

        let resp = send_file(&req, &path, None).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            resp.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 0-99/1000"
        );
        assert_eq!(resp.headers().get(header::ACCEPT_RANGES).unwrap(), "bytes");

        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.len(), 100);
        assert_eq!(body[99], 99);
    }

    #[actix_web::test]
    async fn test_mid_file_slice_starts_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = video_file(&dir, 1000);
        let req = TestRequest::default()
            .insert_header((header::RANGE, "bytes=300-309"))
            .to_http_request();

        let resp = send_file(&req, &path, None).await.unwrap();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let expected: Vec<u8> = (300..310).map(|i| (i % 251) as u8).collect();
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    #[actix_web::test]
    async fn test_full_body_without_range() {
        let dir = TempDir::new().unwrap();
        let path = video_file(&dir, 1000);
        let req = TestRequest::default().to_http_request();

        let resp = send_file(&req, &path, Some("porch_20240102.mp4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"porch_20240102.mp4\""
        );
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.len(), 1000);
    }

    #[actix_web::test]
    async fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let req = TestRequest::default().to_http_request();
        let err = send_file(&req, &dir.path().join("gone.mp4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
