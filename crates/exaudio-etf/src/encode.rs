//! Reply encoder
//!
//! Replies have one shape only: a one-element tuple holding a binary,
//! `{<<"okay">>}`.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::term::{BINARY_TAG, KEY_MAX, MAGIC, TUPLE_TAG};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Key is {0} bytes, longer than 32")]
    KeyTooLong(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the reply frame for `key`
pub fn encode_ack_to_vec(key: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if key.len() > KEY_MAX {
        return Err(EncodeError::KeyTooLong(key.len()));
    }
    let mut frame = Vec::with_capacity(8 + key.len());
    frame.extend_from_slice(&[MAGIC, TUPLE_TAG, 1, BINARY_TAG]);
    frame.extend_from_slice(&(key.len() as u32).to_be_bytes());
    frame.extend_from_slice(key);
    Ok(frame)
}

/// Write the reply frame for `key` to `stream` and flush it
pub async fn encode_ack<W>(stream: &mut W, key: &str) -> Result<(), EncodeError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_ack_to_vec(key.as_bytes())?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    trace!(key = %key, len = frame.len(), "sent reply");
    Ok(())
}
