//! JDWP stream codec
//!
//! Frames are self-delimiting through their leading length field. The
//! reader never resynchronizes: once a frame boundary is lost the caller
//! must drop the connection.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

use super::constants::{HANDSHAKE, HEADER_SIZE};
use super::packet::{self, Packet};

/// Read one raw frame (header included) from the stream
///
/// End of stream before the first length byte is a clean disconnect;
/// anywhere later it is a truncated frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max_len: u32) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::AgentDisconnected
        } else {
            Error::Io(e)
        }
    })?;
    let len = u32::from_be_bytes(len_buf);

    if (len as usize) < HEADER_SIZE {
        return Err(Error::malformed(format!(
            "declared length {} is shorter than the header",
            len
        )));
    }
    if len > max_len {
        return Err(Error::malformed(format!(
            "declared length {} exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut frame = vec![0u8; len as usize];
    frame[..4].copy_from_slice(&len_buf);
    reader.read_exact(&mut frame[4..]).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::malformed(format!("stream ended inside a {} byte frame", len))
        } else {
            Error::Io(e)
        }
    })?;

    Ok(frame)
}

/// Read and decode one frame
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R, max_len: u32) -> Result<Packet> {
    let frame = read_frame(reader, max_len).await?;
    packet::decode(&frame)
}

/// Write an encoded frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Debugger side of the handshake: send first, then expect the echo
pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    timeout: Duration,
) -> Result<()> {
    with_handshake_timeout(timeout, async {
        stream.write_all(HANDSHAKE).await?;
        stream.flush().await?;
        expect_handshake(&mut *stream).await
    })
    .await
}

/// Agent side of the handshake: expect the string, then echo it
pub async fn accept_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    timeout: Duration,
) -> Result<()> {
    with_handshake_timeout(timeout, async {
        expect_handshake(&mut *stream).await?;
        stream.write_all(HANDSHAKE).await?;
        stream.flush().await?;
        Ok::<(), Error>(())
    })
    .await
}

async fn expect_handshake<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    let mut received = [0u8; 14];
    reader.read_exact(&mut received).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Handshake("connection closed during handshake".to_string())
        } else {
            Error::Io(e)
        }
    })?;
    if &received != HANDSHAKE {
        return Err(Error::Handshake(format!(
            "expected 'JDWP-Handshake', received {:?}",
            String::from_utf8_lossy(&received)
        )));
    }
    Ok(())
}

async fn with_handshake_timeout<F>(timeout: Duration, fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout(timeout.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdwp::packet::{encode, ReplyPacket};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_consecutive_frames() {
        let mut data = encode(1, 1, 1, &[]).unwrap();
        data.extend(ReplyPacket::new(1, 0, b"ok".to_vec()).to_bytes().unwrap());
        let mut reader = Cursor::new(data);

        let first = read_packet(&mut reader, 1024).await.unwrap();
        assert!(!first.is_reply());
        let second = read_packet(&mut reader, 1024).await.unwrap();
        assert!(second.is_reply());
        assert_eq!(second.data(), b"ok");

        let eof = read_packet(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(eof, Error::AgentDisconnected));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let mut data = encode(1, 1, 1, &[1, 2, 3, 4]).unwrap();
        data.truncate(data.len() - 2);
        let mut reader = Cursor::new(data);

        let err = read_frame(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_undersized() {
        let mut reader = Cursor::new(vec![0, 0, 4, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            read_frame(&mut reader, 512).await,
            Err(Error::MalformedFrame(_))
        ));

        let mut reader = Cursor::new(vec![0, 0, 0, 3]);
        assert!(matches!(
            read_frame(&mut reader, 512).await,
            Err(Error::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let frame = encode(1, 9, 7, &[]).unwrap();
        let mut output = Vec::new();
        write_frame(&mut output, &frame).await.unwrap();
        assert_eq!(output, frame);
    }

    #[tokio::test]
    async fn test_handshake_pair() {
        let (mut debugger, mut agent) = tokio::io::duplex(64);
        let timeout = Duration::from_secs(5);

        let agent_side = tokio::spawn(async move { accept_handshake(&mut agent, timeout).await });
        handshake(&mut debugger, timeout).await.unwrap();
        agent_side.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handshake_mismatch() {
        let (mut debugger, mut agent) = tokio::io::duplex(64);

        let agent_side = tokio::spawn(async move {
            let mut buf = [0u8; 14];
            agent.read_exact(&mut buf).await.unwrap();
            agent.write_all(b"NOT-Handshake!").await.unwrap();
        });

        let err = handshake(&mut debugger, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake(_)));
        agent_side.await.unwrap();
    }
}
