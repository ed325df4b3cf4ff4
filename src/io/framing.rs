//! Stream framing
//!
//! Each message travels as `0x0B <payload> 0x1C 0x0D`. Bytes outside a frame
//! are discarded. No checksum is carried.

use crate::error::{ReferralError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Start-of-frame byte
pub const START_BLOCK: u8 = 0x0B;
/// End-of-frame byte, followed by [`CARRIAGE_RETURN`]
pub const END_BLOCK: u8 = 0x1C;
/// Final frame byte
pub const CARRIAGE_RETURN: u8 = 0x0D;

/// Wrap `payload` in frame delimiters
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 3);
    buf.put_u8(START_BLOCK);
    buf.put_slice(payload);
    buf.put_u8(END_BLOCK);
    buf.put_u8(CARRIAGE_RETURN);
    buf.freeze()
}

/// Write one framed payload and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await?;
    trace!(bytes_sent = payload.len() + 3, "Frame written");
    Ok(())
}

/// Reads frames from a byte stream, keeping leftover bytes between calls
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
    max_frame_size: usize,
    /// Offset into `buf` up to which no end marker starts
    scanned: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader`, rejecting payloads larger than `max_frame_size`
    pub fn new(reader: R, max_frame_size: usize) -> Self {
        FrameReader {
            reader,
            buf: BytesMut::with_capacity(4096),
            max_frame_size,
            scanned: 0,
        }
    }

    /// Read the next frame payload
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    ///
    /// # Errors
    /// - [`ReferralError::Io`] with `UnexpectedEof` when the stream ends inside a frame
    /// - [`ReferralError::FrameTooLarge`] when the payload exceeds the maximum
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.try_extract()? {
                trace!(bytes_read = frame.len(), "Frame received");
                return Ok(Some(frame));
            }

            if self.reader.read_buf(&mut self.buf).await? == 0 {
                self.discard_noise();
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ReferralError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed inside a frame",
                )));
            }
        }
    }

    /// Drop everything before the next start block
    fn discard_noise(&mut self) {
        match self.buf.iter().position(|&b| b == START_BLOCK) {
            Some(0) => {}
            Some(pos) => {
                self.buf.advance(pos);
                self.scanned = 0;
            }
            None => {
                self.buf.clear();
                self.scanned = 0;
            }
        }
    }

    fn try_extract(&mut self) -> Result<Option<Bytes>> {
        self.discard_noise();
        if self.buf.is_empty() {
            return Ok(None);
        }

        // Resume after the bytes already searched; the last byte is kept in
        // range since it may be an end block whose carriage return is unread
        let from = self.scanned.max(1);
        let end = self.buf[from..]
            .windows(2)
            .position(|w| w == [END_BLOCK, CARRIAGE_RETURN])
            .map(|p| p + from);

        match end {
            Some(end) => {
                let payload_len = end - 1;
                if payload_len > self.max_frame_size {
                    return Err(ReferralError::FrameTooLarge {
                        size: payload_len,
                        max: self.max_frame_size,
                    });
                }
                let frame = self.buf.split_to(end + 2).freeze();
                self.scanned = 0;
                Ok(Some(frame.slice(1..end)))
            }
            None if self.buf.len() > self.max_frame_size + 3 => Err(ReferralError::FrameTooLarge {
                size: self.buf.len() - 1,
                max: self.max_frame_size,
            }),
            None => {
                self.scanned = self.buf.len().saturating_sub(1);
                Ok(None)
            }
        }
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(b"MSH");
        assert_eq!(&frame[..], b"\x0bMSH\x1c\x0d");
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let mock = Builder::new()
            .read(b"\x0bAB")
            .read(b"C\x1c\x0d\x0bDE\x1c\x0d")
            .build();
        let mut reader = FrameReader::new(mock, 1024);

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"ABC"[..]);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"DE"[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_trickled_in_small_reads() {
        let mock = Builder::new()
            .read(b"\x0bMS")
            .read(b"H|")
            .read(b"A\x1c")
            .read(b"\x0d\x0b")
            .read(b"B")
            .read(b"C\x1c")
            .read(b"\x0d")
            .build();
        let mut reader = FrameReader::new(mock, 1024);

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"MSH|A"[..]);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"BC"[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_resumes_where_it_stopped() {
        let mock = Builder::new().read(b"\x0bABCD").read(b"EF").build();
        let mut reader = FrameReader::new(mock, 1024);

        reader.reader.read_buf(&mut reader.buf).await.unwrap();
        assert!(reader.try_extract().unwrap().is_none());
        assert_eq!(reader.scanned, 4);

        reader.reader.read_buf(&mut reader.buf).await.unwrap();
        assert!(reader.try_extract().unwrap().is_none());
        assert_eq!(reader.scanned, 6);
    }

    #[tokio::test]
    async fn test_noise_between_frames_is_discarded() {
        let mock = Builder::new().read(b"\r\n\x0bAB\x1c\x0d\n").build();
        let mut reader = FrameReader::new(mock, 1024);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), &b"AB"[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_frame() {
        let mock = Builder::new().read(b"\x0bMSH|partial").build();
        let mut reader = FrameReader::new(mock, 1024);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, ReferralError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mock = Builder::new().read(b"\x0b0123456789\x1c\x0d").build();
        let mut reader = FrameReader::new(mock, 4);
        assert!(matches!(
            reader.read_frame().await,
            Err(ReferralError::FrameTooLarge { size: 10, max: 4 })
        ));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut mock = Builder::new().write(b"\x0bMSH\x1c\x0d").build();
        write_frame(&mut mock, b"MSH").await.unwrap();
    }
}
