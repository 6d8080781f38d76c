//! A single TCP connection in either of its two lifetimes: plaintext
//! (used for `/pair-setup` and `/pair-verify`) and, after a successful
//! Pair-Verify, encrypted via [`SessionFramer`].

use crate::framing::SessionFramer;
use crate::http::{read_response, Request, Response};
use hap_core::{Error, Result};
use hap_pairing::SessionKeys;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

enum State<S> {
    Plaintext(S),
    Encrypted(SessionFramer<S>),
    /// Only observed transiently inside [`IpConnection::upgrade`].
    Transitioning,
}

/// One HAP IP connection, owning the raw stream for exactly as long as
/// the connection is open; dropping it closes the underlying socket.
pub struct IpConnection<S> {
    state: State<S>,
}

impl<S> IpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { state: State::Plaintext(stream) }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.state, State::Encrypted(_))
    }

    /// Switch this connection to encrypted framing after Pair-Verify
    /// completes. Consumes the plaintext stream and wraps it; calling
    /// this twice is a usage error.
    pub fn upgrade(&mut self, keys: SessionKeys) -> Result<()> {
        let stream = match std::mem::replace(&mut self.state, State::Transitioning) {
            State::Plaintext(stream) => stream,
            State::Encrypted(_) => return Err(Error::usage("connection is already encrypted")),
            State::Transitioning => unreachable!("only set transiently within this method"),
        };
        let framer = SessionFramer::new(stream, keys.accessory_to_controller_key, keys.controller_to_accessory_key)?;
        self.state = State::Encrypted(framer);
        Ok(())
    }

    /// Send one request and read its response, using whichever framing
    /// this connection is currently in.
    pub async fn request(&mut self, req: &Request) -> Result<Response> {
        let bytes = req.to_bytes();
        match &mut self.state {
            State::Plaintext(stream) => {
                stream.write_all(&bytes).await.map_err(|e| Error::transport(format!("write failed: {e}")))?;
                read_response(stream).await
            }
            State::Encrypted(framer) => {
                framer.write_payload(&bytes).await?;
                read_response(framer).await
            }
            State::Transitioning => unreachable!("only set transiently within upgrade()"),
        }
    }

    /// Read one more chunk of response bytes off the wire, used by the
    /// event-stream reader once a connection has switched to expecting
    /// event frames interleaved with responses.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        use crate::http::ByteSource;
        match &mut self.state {
            State::Plaintext(stream) => stream.read_more().await,
            State::Encrypted(framer) => framer.read_frame().await,
            State::Transitioning => unreachable!("only set transiently within upgrade()"),
        }
    }
}

impl<S> crate::http::ByteSource for IpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn read_more(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_chunk().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::CONTENT_TYPE_JSON;
    use tokio::io::duplex;

    #[tokio::test]
    async fn plaintext_request_round_trips_over_a_duplex_stream() {
        let (client_io, mut server_io) = duplex(4096);
        let mut connection = IpConnection::new(client_io);

        let server = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = vec![0u8; 4096];
            let n = server_io.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("GET /accessories"));
            server_io
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: 2\r\n\r\n{}")
                .await
                .unwrap();
        });

        let response = connection.request(&Request::get("/accessories")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some(CONTENT_TYPE_JSON));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn upgrading_an_already_encrypted_connection_is_rejected() {
        let (client_io, _server_io) = duplex(4096);
        let mut connection = IpConnection::new(client_io);
        connection.upgrade(SessionKeys { accessory_to_controller_key: [1; 32], controller_to_accessory_key: [2; 32] }).unwrap();
        assert!(connection.is_encrypted());

        let err = connection.upgrade(SessionKeys { accessory_to_controller_key: [1; 32], controller_to_accessory_key: [2; 32] }).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
