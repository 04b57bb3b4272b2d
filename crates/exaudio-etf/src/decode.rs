//! Streaming decoder for command tuples
//!
//! [`decode_message`] pulls exactly one command off an async byte stream. It
//! never reads past the end of the message, so the stream stays aligned for
//! the next call as long as the error it returns is not fatal.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::term::{
    CommandMessage, Key, Value, BINARY_TAG, INT_TAG, KEY_MAX, LIST_TAG, MAGIC, MAX_ARITY, NIL_TAG,
    SMALL_INT_TAG, STRING_TAG, TUPLE_TAG,
};

/// Upper bound on capacity reserved up front from a declared length
const PREALLOC_LIMIT: usize = 4096;

/// Chunk size used when reading or draining byte runs
const CHUNK: usize = 1024;

/// How a decode failure affects the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Stream ended cleanly between messages
    EndOfStream,
    /// Stream ended or failed mid-message; its position is unknown
    Malformed,
    /// Message was well framed up to an unexpected byte; drop it and continue
    ProtocolViolation,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("End of stream")]
    EndOfStream,
    #[error("Stream truncated after {consumed} bytes of a message")]
    Truncated { consumed: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Bad magic byte: expected 131, got {0}")]
    BadMagic(u8),
    #[error("Expected small tuple tag 104, got {0}")]
    NotTuple(u8),
    #[error("Tuple arity {0} exceeds 2")]
    BadArity(u8),
    #[error("Unexpected tag {tag} in {position}")]
    UnexpectedTag { position: &'static str, tag: u8 },
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::EndOfStream => DecodeErrorKind::EndOfStream,
            DecodeError::Truncated { .. } | DecodeError::Io(_) => DecodeErrorKind::Malformed,
            DecodeError::BadMagic(_)
            | DecodeError::NotTuple(_)
            | DecodeError::BadArity(_)
            | DecodeError::UnexpectedTag { .. } => DecodeErrorKind::ProtocolViolation,
        }
    }

    /// True when the stream can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        self.kind() == DecodeErrorKind::Malformed
    }
}

/// Reader that tracks how much of the current message has been consumed
struct TermReader<'a, R> {
    inner: &'a mut R,
    consumed: usize,
}

impl<'a, R: AsyncRead + Unpin> TermReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, consumed: 0 }
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = match self.inner.read(&mut buf[filled..]).await {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            };
            if n == 0 {
                return Err(if self.consumed == 0 {
                    DecodeError::EndOfStream
                } else {
                    DecodeError::Truncated {
                        consumed: self.consumed,
                    }
                });
            }
            filled += n;
            self.consumed += n;
        }
        Ok(())
    }

    async fn u8(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf).await?;
        Ok(buf[0])
    }

    async fn u16(&mut self) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    async fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    async fn i32(&mut self) -> Result<i32, DecodeError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf).await?;
        Ok(i32::from_be_bytes(buf))
    }

    /// Read `len` bytes, growing the buffer only as data arrives
    async fn bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let mut chunk = [0u8; CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            self.fill(&mut chunk[..take]).await?;
            out.extend_from_slice(&chunk[..take]);
            remaining -= take;
        }
        Ok(out)
    }

    /// Consume and discard `len` bytes
    async fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        let mut chunk = [0u8; CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(CHUNK);
            self.fill(&mut chunk[..take]).await?;
            remaining -= take;
        }
        Ok(())
    }
}

/// Decode one command tuple from `stream`
///
/// Returns [`DecodeError::EndOfStream`] only when the stream ended before the
/// first byte of the message.
pub async fn decode_message<R>(stream: &mut R) -> Result<CommandMessage, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = TermReader::new(stream);

    let magic = reader.u8().await?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let tag = reader.u8().await?;
    if tag != TUPLE_TAG {
        return Err(DecodeError::NotTuple(tag));
    }
    let arity = reader.u8().await?;
    if arity > MAX_ARITY {
        return Err(DecodeError::BadArity(arity));
    }
    if arity == 0 {
        trace!("decoded {{}}");
        return Ok(CommandMessage::empty());
    }

    let key = decode_key(&mut reader).await?;
    if arity == 1 {
        trace!(key = %key, "decoded key-only tuple");
        return Ok(CommandMessage {
            key,
            arity,
            value: None,
        });
    }

    let value = decode_value(&mut reader).await?;
    trace!(key = %key, consumed = reader.consumed, "decoded tuple with value");
    Ok(CommandMessage {
        key,
        arity,
        value: Some(value),
    })
}

async fn decode_key<R: AsyncRead + Unpin>(reader: &mut TermReader<'_, R>) -> Result<Key, DecodeError> {
    let tag = reader.u8().await?;
    if tag != BINARY_TAG {
        return Err(DecodeError::UnexpectedTag {
            position: "key",
            tag,
        });
    }
    let len = reader.u32().await? as usize;
    let kept = len.min(KEY_MAX);
    let bytes = reader.bytes(kept).await?;
    if len > kept {
        trace!(declared = len, kept, "draining oversized key");
        reader.skip(len - kept).await?;
    }
    Ok(Key::truncated(&bytes))
}

async fn decode_value<R: AsyncRead + Unpin>(
    reader: &mut TermReader<'_, R>,
) -> Result<Value, DecodeError> {
    let tag = reader.u8().await?;
    match tag {
        NIL_TAG => Ok(Value::Nil),
        SMALL_INT_TAG => Ok(Value::Integer(i32::from(reader.u8().await?))),
        INT_TAG => Ok(Value::Integer(reader.i32().await?)),
        BINARY_TAG => {
            let len = reader.u32().await? as usize;
            Ok(Value::Blob(reader.bytes(len).await?))
        }
        STRING_TAG => {
            let len = usize::from(reader.u16().await?);
            let bytes = reader.bytes(len).await?;
            Ok(Value::IntList(bytes.into_iter().map(i32::from).collect()))
        }
        LIST_TAG => {
            let len = reader.u32().await? as usize;
            let mut list = Vec::with_capacity(len.min(PREALLOC_LIMIT));
            for _ in 0..len {
                let element = reader.u8().await?;
                let value = match element {
                    SMALL_INT_TAG => i32::from(reader.u8().await?),
                    INT_TAG => reader.i32().await?,
                    tag => {
                        return Err(DecodeError::UnexpectedTag {
                            position: "list element",
                            tag,
                        })
                    }
                };
                list.push(value);
            }
            let tail = reader.u8().await?;
            if tail != NIL_TAG {
                return Err(DecodeError::UnexpectedTag {
                    position: "list tail",
                    tag: tail,
                });
            }
            Ok(Value::IntList(list))
        }
        tag => Err(DecodeError::UnexpectedTag {
            position: "value",
            tag,
        }),
    }
}
