//! Session-service framing for messages over a byte stream.
//!
//! Each message is prefixed with a 4-byte big-endian length.
//! The top byte is the message type (0x00 = session message).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size we'll accept (8 MB).
pub const MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;

/// Largest length the 3-byte length field can carry.
const LENGTH_MASK: u32 = 0x00FF_FFFF;

/// Read a single framed message from the stream.
pub async fn read_frame<R>(stream: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    // first byte is the type, bytes 1-3 are the length
    let len = u32::from_be_bytes(len_buf) & LENGTH_MASK;

    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write a single framed message to the stream.
pub async fn write_frame<W>(stream: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_FRAME_SIZE as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Frame too large: {} bytes", data.len()),
        ));
    }
    // Type byte 0x00 (session message) is already 0 in the top byte
    let len_bytes = (data.len() as u32).to_be_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}
