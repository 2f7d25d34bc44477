//! Length-prefixed framing on the control socket.
//!
//! - client -> daemon: `u32` little-endian length, then exactly that many
//!   request bytes. The length must equal [`REQUEST_SIZE`].
//! - daemon -> client: the fixed-size result record, unframed.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use admctrl_core::protocol::{AuthResult, REQUEST_SIZE};

/// Next request frame, or `None` on a clean end of stream between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<Bytes>> {
    let len = match r.read_u32_le().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len != REQUEST_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len}, expected {REQUEST_SIZE}"),
        ));
    }
    let mut buf = BytesMut::zeroed(len);
    r.read_exact(&mut buf).await?;
    Ok(Some(buf.freeze()))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, request: &[u8]) -> io::Result<()> {
    let len = u32::try_from(request.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "request too large"))?;
    w.write_u32_le(len).await?;
    w.write_all(request).await?;
    w.flush().await
}

pub async fn write_result<W: AsyncWrite + Unpin>(w: &mut W, result: &AuthResult) -> io::Result<()> {
    w.write_all(&result.encode()).await?;
    w.flush().await
}
