//! Frame reading from the IPC stream.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use lyssna_protocols::{Frame, FrameHeader, HEADER_LEN};

use crate::error::CaptureError;

/// Reads the next frame.
///
/// Waits indefinitely for the first byte; once it arrives, the rest of the
/// header and the body must follow within `read_timeout`. Returns `None` on a
/// clean end of stream between frames.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_len: usize,
    read_timeout: Duration,
) -> Result<Option<(FrameHeader, Bytes)>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }

    let rest = async {
        reader.read_exact(&mut header[1..]).await?;
        let header = FrameHeader::parse(&header)?;
        let len = header.body_len as usize;
        if len > max_len {
            return Err(CaptureError::FrameTooLarge { len, max: max_len });
        }
        let mut body = BytesMut::zeroed(len);
        reader.read_exact(&mut body).await?;
        Ok::<_, CaptureError>((header, body.freeze()))
    };

    match tokio::time::timeout(read_timeout, rest).await {
        Ok(result) => result.map(Some),
        Err(_) => Err(CaptureError::ReadTimeout(read_timeout)),
    }
}

pub(crate) async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), CaptureError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}
