//! `EVENT/1.0 200 OK` frame parsing.
//!
//! After a subscription PUT succeeds on a connection, the reader
//! switches from expecting HTTP responses to expecting a mix of
//! responses and event frames; event frames share the header/body
//! shape of an HTTP response but use the `EVENT/1.0` status line.

use crate::http::{ByteSource, Response};
use hap_core::{Error, Result};

pub const EVENT_STATUS_LINE: &str = "EVENT/1.0 200 OK";
const HTTP_EQUIVALENT_STATUS_LINE: &str = "HTTP/1.1 200 OK ";

/// Parses one event frame's header block, already known to start with
/// [`EVENT_STATUS_LINE`], the same way [`crate::http::read_response`]
/// parses an HTTP response, substituting the status line for
/// `httparse`'s benefit so the same header/`Content-Length` parsing
/// logic applies.
pub async fn read_event<B: ByteSource>(source: &mut B) -> Result<Response> {
    crate::http::read_response_with_status_line_rewrite(source, EVENT_STATUS_LINE, HTTP_EQUIVALENT_STATUS_LINE).await
}

/// Checks whether a buffered prefix is (or could still become) an
/// event frame rather than an HTTP response, so the connection reader
/// knows which parser to dispatch to once enough bytes have arrived.
pub fn looks_like_event(prefix: &[u8]) -> bool {
    let probe_len = EVENT_STATUS_LINE.len().min(prefix.len());
    prefix[..probe_len] == EVENT_STATUS_LINE.as_bytes()[..probe_len]
}

/// Deserializes an event frame's JSON body into per-characteristic
/// values, the same shape a `/characteristics` GET returns.
pub fn parse_event_body(body: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(body).map_err(|e| Error::protocol(format!("malformed event body: {e}")))
}
