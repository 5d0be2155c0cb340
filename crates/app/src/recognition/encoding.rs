//! Multipart framing for the MJPEG stream.

use actix_web::web::Bytes;

/// Boundary token announced in the stream's content type.
pub(crate) const BOUNDARY: &str = "frame";
pub(crate) const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// One encoded frame ready for the multipart stream.
#[derive(Clone, Debug)]
pub(crate) struct FramePacket {
    pub(crate) jpeg: Vec<u8>,
    pub(crate) frame_number: u64,
}

impl FramePacket {
    /// Wrap the JPEG in one multipart part: boundary line, headers, blank
    /// line, body, CRLF.
    pub(crate) fn into_chunk(self) -> Bytes {
        let mut payload = Vec::with_capacity(self.jpeg.len() + 96);
        payload.extend_from_slice(b"--");
        payload.extend_from_slice(BOUNDARY.as_bytes());
        payload.extend_from_slice(b"\r\n");
        payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
        payload.extend_from_slice(format!("X-Sequence: {}\r\n\r\n", self.frame_number).as_bytes());
        payload.extend_from_slice(&self.jpeg);
        payload.extend_from_slice(b"\r\n");
        Bytes::from(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_layout() {
        let chunk = FramePacket {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            frame_number: 12,
        }
        .into_chunk();
        let mut expected =
            b"--frame\r\nContent-Type: image/jpeg\r\nX-Sequence: 12\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(chunk.as_ref(), expected.as_slice());
    }

    #[test]
    fn content_type_names_the_boundary() {
        assert!(STREAM_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }
}
