//! HTTP response head.
use bytes::BytesMut;

use crate::http::{StatusCode, httpdate_now};

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    status: StatusCode,
    content_type: Option<&'static str>,
    content_length: Option<u64>,
}

impl ResponseHead {
    /// Create response head with given status and no content headers.
    #[inline]
    pub const fn new(status: StatusCode) -> Self {
        Self { status, content_type: None, content_length: None }
    }

    /// Set the `Content-Type` header.
    #[inline]
    pub const fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Set the `Content-Length` header.
    #[inline]
    pub const fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    #[inline]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub const fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    #[inline]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Write HTTP/1.1 response head into `buf`, including the empty line that ends it.
    pub fn write(&self, buf: &mut BytesMut, keep_alive: bool) {
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.extend_from_slice(b"\r\nDate: ");
        buf.extend_from_slice(&httpdate_now()[..]);

        if let Some(content_type) = self.content_type {
            buf.extend_from_slice(b"\r\nContent-Type: ");
            buf.extend_from_slice(content_type.as_bytes());
        }

        if let Some(len) = self.content_length {
            buf.extend_from_slice(b"\r\nContent-Length: ");
            buf.extend_from_slice(itoa::Buffer::new().format(len).as_bytes());
        }

        if !keep_alive {
            buf.extend_from_slice(b"\r\nConnection: close");
        }

        buf.extend_from_slice(b"\r\n\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_head() {
        let head = ResponseHead::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_content_length(120);

        let mut buf = BytesMut::new();
        head.write(&mut buf, false);
        let text = str::from_utf8(&buf).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\nDate: "));
        assert!(text.contains("\r\nContent-Type: text/plain\r\n"));
        assert!(text.contains("\r\nContent-Length: 120\r\n"));
        assert!(text.ends_with("\r\nConnection: close\r\n\r\n"));
    }

    #[test]
    fn test_write_empty_head() {
        let mut buf = BytesMut::new();
        ResponseHead::new(StatusCode::NOT_FOUND)
            .with_content_length(0)
            .write(&mut buf, true);
        let text = str::from_utf8(&buf).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!text.contains("Content-Type"));
        assert!(!text.contains("Connection"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
