//! Minimal HTTP/1.1 request/response handling for the HAP IP transport.
//!
//! A general-purpose HTTP client can't be used here: the transport
//! owns the raw byte stream for encrypted-frame purposes once
//! Pair-Verify completes, so requests are built and responses parsed
//! by hand, with [`httparse`] doing header tokenizing.

use hap_core::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const CONTENT_TYPE_JSON: &str = "application/hap+json";
pub const CONTENT_TYPE_TLV8: &str = "application/pairing+tlv8";

/// A source of raw response bytes: a plaintext stream pre-verify, or
/// the decrypted output of [`crate::framing::SessionFramer`]
/// post-verify. Abstracts over the two so [`read_response`] doesn't
/// need to know which framing is in effect.
pub trait ByteSource {
    async fn read_more(&mut self) -> Result<Option<Vec<u8>>>;
}

impl<S: AsyncRead + Unpin> ByteSource for S {
    async fn read_more(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; 4096];
        let n = self.read(&mut buf).await.map_err(|e| Error::transport(format!("read failed: {e}")))?;
        if n == 0 {
            Ok(None)
        } else {
            buf.truncate(n);
            Ok(Some(buf))
        }
    }
}

/// A request ready to be written to the wire.
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: "GET", path: path.into(), content_type: None, body: Vec::new() }
    }

    pub fn post(path: impl Into<String>, content_type: &'static str, body: Vec<u8>) -> Self {
        Self { method: "POST", path: path.into(), content_type: Some(content_type), body }
    }

    pub fn put(path: impl Into<String>, content_type: &'static str, body: Vec<u8>) -> Self {
        Self { method: "PUT", path: path.into(), content_type: Some(content_type), body }
    }

    /// Serialize into raw HTTP/1.1 bytes, unencrypted; the caller
    /// passes this to the framer (post-verify) or writes it directly
    /// (pre-verify, pairing-only requests).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.path).into_bytes();
        if let Some(content_type) = self.content_type {
            out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// A parsed HTTP/1.1 response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reads and parses a single HTTP/1.1 response from anything that
/// yields decrypted (or, pre-verify, plaintext) bytes one chunk at a
/// time. `read_more` is called whenever more bytes are needed, both to
/// complete the header block and to satisfy `Content-Length`.
pub async fn read_response<B: ByteSource>(source: &mut B) -> Result<Response> {
    read_response_with_status_line_rewrite(source, "HTTP/1.1", "HTTP/1.1").await
}

/// Shared by [`read_response`] and the event-frame reader: `httparse`
/// only recognizes an `HTTP/` version token, so a non-HTTP status line
/// (`EVENT/1.0 200 OK`) is rewritten to an equal-length HTTP one before
/// parsing; the caller never sees the substitution.
pub(crate) async fn read_response_with_status_line_rewrite<B: ByteSource>(
    source: &mut B,
    expected_prefix: &str,
    rewrite_to: &str,
) -> Result<Response> {
    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        match source.read_more().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => return Err(Error::transport("connection closed before HTTP headers completed")),
        }
    };

    if !buf.starts_with(expected_prefix.as_bytes()) {
        return Err(Error::protocol(format!("expected a response starting with {expected_prefix}")));
    }
    debug_assert_eq!(expected_prefix.len(), rewrite_to.len(), "status line rewrite must preserve length");
    if expected_prefix != rewrite_to {
        buf[..rewrite_to.len()].copy_from_slice(rewrite_to.as_bytes());
    }

    let mut headers_storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Response::new(&mut headers_storage);
    let parse_result = parsed
        .parse(&buf[..header_end])
        .map_err(|e| Error::protocol(format!("malformed HTTP response: {e}")))?;
    if parse_result.is_partial() {
        return Err(Error::protocol("malformed HTTP response: incomplete status line"));
    }

    let status = parsed.code.ok_or_else(|| Error::protocol("HTTP response missing status code"))?;
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf.split_off(header_end);
    while body.len() < content_length {
        match source.read_more().await? {
            Some(chunk) => body.extend_from_slice(&chunk),
            None => return Err(Error::transport("connection closed before response body completed")),
        }
    }
    body.truncate(content_length);

    Ok(Response { status, headers, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds pre-scripted chunks to [`read_response`], standing in for
    /// a real stream or [`crate::framing::SessionFramer`].
    struct ScriptedSource(std::collections::VecDeque<Vec<u8>>);

    impl ByteSource for ScriptedSource {
        async fn read_more(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn request_serializes_with_content_length() {
        let req = Request::post("/pair-setup", CONTENT_TYPE_TLV8, vec![1, 2, 3]);
        let bytes = req.to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("POST /pair-setup HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(bytes.ends_with(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn reads_response_across_multiple_chunks() {
        let full = b"HTTP/1.1 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let mut source = ScriptedSource([full[..20].to_vec(), full[20..].to_vec()].into_iter().collect());

        let response = read_response(&mut source).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
        assert_eq!(response.header("Content-Type"), Some(CONTENT_TYPE_JSON));
    }

    #[tokio::test]
    async fn multi_status_response_is_still_parsed_as_a_plain_response() {
        let full = b"HTTP/1.1 207 Multi-Status\r\nContent-Length: 2\r\n\r\n{}".to_vec();
        let mut source = ScriptedSource([full].into_iter().collect());

        let response = read_response(&mut source).await.unwrap();

        assert_eq!(response.status, 207);
        assert!(response.is_success());
        assert_eq!(response.body, b"{}");
    }
}
