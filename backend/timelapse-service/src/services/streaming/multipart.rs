//! `multipart/x-mixed-replace` framing for MJPEG responses

use bytes::{BufMut, Bytes, BytesMut};

pub const BOUNDARY: &str = "frame";

/// Response content type announcing the boundary used by [`encode_frame`]
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Wraps one JPEG in its multipart part: boundary line, part header,
/// raw bytes, trailing CRLF.
pub fn encode_frame(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    buf.put_slice(PART_HEADER);
    buf.put_slice(jpeg);
    buf.put_slice(PART_TRAILER);
    buf.freeze()
}
