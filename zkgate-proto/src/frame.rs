//! Length-prefixed framing over a byte stream.
//!
//! Every message on the wire is a 32-bit big-endian length followed by
//! exactly that many payload bytes. Frames above [`MAX_FRAME_SIZE`] are a
//! protocol error: the caller is expected to terminate the connection,
//! since request/reply ordering with the peer is already lost.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{WireError, WireResult};

/// Maximum accepted frame payload (1536 KiB).
pub const MAX_FRAME_SIZE: usize = 1536 * 1024;

/// Size of the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Reads one frame into `buf`, replacing its contents with the payload.
///
/// Returns the payload length. `buf` is resized to exactly that length, so
/// a pooled buffer keeps its capacity across calls.
///
/// # Errors
///
/// Returns [`WireError::FrameTooLarge`] if the announced length exceeds
/// [`MAX_FRAME_SIZE`], or [`WireError::Io`] on socket errors (including a
/// peer disconnect mid-frame).
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> WireResult<usize>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    buf.resize(len, 0);
    reader.read_exact(&mut buf[..]).await?;

    Ok(len)
}

/// Writes `payload` as one length-prefixed frame and flushes.
///
/// # Errors
///
/// Returns [`WireError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`], or [`WireError::Io`] on socket errors.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> WireResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    // Safe cast: bounded by MAX_FRAME_SIZE which fits in u32.
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}
