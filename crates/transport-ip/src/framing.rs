//! Length-prefixed ChaCha20-Poly1305 framing for an encrypted HAP IP
//! session, applied after Pair-Verify completes.
//!
//! Outbound payloads are split into chunks of at most
//! [`MAX_CHUNK_LEN`] bytes; each chunk is framed as a 2-byte
//! little-endian length (used as AEAD associated data), the
//! ciphertext, and a 16-byte tag. Each direction carries its own
//! monotonically increasing counter used as the nonce.

use crate::http::ByteSource;
use hap_core::{Error, Result};
use hap_crypto::aead::{nonce, Cipher, SessionKey, TAG_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_CHUNK_LEN: usize = 1024;
const LEN_PREFIX_SIZE: usize = 2;

/// An encrypted duplex session layered on top of a raw byte stream.
pub struct SessionFramer<S> {
    stream: S,
    read_key: Cipher,
    write_key: Cipher,
    read_counter: u64,
    write_counter: u64,
}

impl<S> SessionFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, accessory_to_controller_key: [u8; 32], controller_to_accessory_key: [u8; 32]) -> Result<Self> {
        Ok(Self {
            stream,
            read_key: Cipher::new(SessionKey::from_bytes(&accessory_to_controller_key)?),
            write_key: Cipher::new(SessionKey::from_bytes(&controller_to_accessory_key)?),
            read_counter: 0,
            write_counter: 0,
        })
    }

    /// Encrypt and write `payload`, chunked per [`MAX_CHUNK_LEN`].
    pub async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        for chunk in payload.chunks(MAX_CHUNK_LEN) {
            let len_prefix = (chunk.len() as u16).to_le_bytes();
            let ciphertext = self
                .write_key
                .encrypt(&nonce::counter(self.write_counter), chunk, &len_prefix)?;
            self.write_counter += 1;

            self.stream
                .write_all(&len_prefix)
                .await
                .map_err(|e| Error::transport(format!("write failed: {e}")))?;
            self.stream
                .write_all(&ciphertext)
                .await
                .map_err(|e| Error::transport(format!("write failed: {e}")))?;
        }
        Ok(())
    }

    /// Read and decrypt one frame, returning `None` on clean EOF before
    /// any byte of the length prefix.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_prefix = [0u8; LEN_PREFIX_SIZE];
        match self.stream.read_exact(&mut len_prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::transport(format!("read failed: {e}"))),
        }
        let len = u16::from_le_bytes(len_prefix) as usize;

        let mut sealed = vec![0u8; len + TAG_SIZE];
        self.stream
            .read_exact(&mut sealed)
            .await
            .map_err(|e| Error::transport(format!("read failed: {e}")))?;

        let plaintext = self
            .read_key
            .decrypt(&nonce::counter(self.read_counter), &sealed, &len_prefix)?;
        self.read_counter += 1;
        Ok(Some(plaintext))
    }

    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }

    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> ByteSource for SessionFramer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn read_more(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_frame().await
    }
}
