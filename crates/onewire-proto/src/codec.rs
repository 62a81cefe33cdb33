//! Length-prefixed framing for the remote-bus protocol.
//!
//! Works over any duplex async stream rather than one concrete transport,
//! since the remote adapter runs over a plain TCP socket.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("frame of {0} bytes exceeds the {1} byte limit")]
    FrameTooLarge(u32, u32),
}

/// Frames are capped well above any legal property payload so a corrupt
/// length prefix can't force an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Send a length-prefixed, postcard-encoded message.
///
/// Warning: this is a private framing; do not write to the stream except
/// through this function.
pub async fn send_message<W, T>(stream: &mut W, message: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let data = postcard::to_allocvec(message)?;
    stream.write_u32_le(data.len() as u32).await?;
    stream.write_all(&data).await?;
    Ok(())
}

/// Receive a length-prefixed, postcard-encoded message.
pub async fn receive_message<R, T>(stream: &mut R) -> Result<T, CodecError>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let len = stream.read_u32_le().await?;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(postcard::from_bytes(&buf)?)
}
