use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::mask::MaskGenerator;
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Frame reader/writer for the client side of a WebSocket stream.
///
/// Outgoing frames are always masked. Incoming headers are validated before
/// their payload is buffered. `read_frame` is cancel safe: bytes already read
/// stay in the internal buffer, so it can be raced in `tokio::select!`.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_chunk: usize,
    masks: MaskGenerator,
    validator: FrameValidator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, config: &Config) -> Self {
        Self::with_buffered(io, config, &[])
    }

    /// Create a codec whose read buffer starts with `buffered`.
    ///
    /// Used for bytes that arrived in the same read as the handshake response.
    #[must_use]
    pub fn with_buffered(io: T, config: &Config, buffered: &[u8]) -> Self {
        let read_chunk = config.read_buffer_size.max(1);
        let mut read_buf = BytesMut::with_capacity(read_chunk.max(buffered.len()));
        read_buf.extend_from_slice(buffered);
        Self {
            io,
            read_buf,
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            read_chunk,
            masks: MaskGenerator::new(),
            validator: FrameValidator::new(config.limits.clone()),
        }
    }

    /// Bytes received but not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed(None)` on a clean end of stream
    /// - `Error::Io` with `UnexpectedEof` if the stream ends inside a frame
    /// - header validation errors from [`FrameValidator::validate_incoming`]
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.validator.validate_incoming(&header)?;
                    match Frame::parse(&self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.read_buf.reserve(self.read_chunk);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(if self.read_buf.is_empty() {
                    Error::ConnectionClosed(None)
                } else {
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()
                });
            }
        }
    }

    /// Mask and write one frame. Call [`flush`](Self::flush) to push it out.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = Some(self.masks.next_mask());
        let wire_size = frame.wire_size(true);
        self.write_buf.clear();
        self.write_buf.resize(wire_size, 0);

        let written = frame.write(&mut self.write_buf, mask)?;
        self.io.write_all(&self.write_buf[..written]).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::protocol::OpCode;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    struct MockStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
        shut_down: bool,
    }

    impl MockStream {
        fn new(data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(data),
                write_data: Vec::new(),
                shut_down: false,
            }
        }

        fn written(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let pos = self.read_data.position() as usize;
            let data = self.read_data.get_ref();
            if pos >= data.len() {
                return Poll::Ready(Ok(()));
            }
            let remaining = &data[pos..];
            let to_copy = std::cmp::min(remaining.len(), buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.read_data.set_position((pos + to_copy) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.shut_down = true;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_frame_is_masked() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), &Config::default());

        codec.write_frame(&Frame::text("Hi")).await.unwrap();

        let written = codec.get_ref().written();
        assert_eq!(written[0], 0x81);
        assert_eq!(written[1], 0x82);
        assert_eq!(written.len(), 8);

        let (frame, _) = Frame::parse(written).unwrap();
        assert_eq!(frame.payload(), b"Hi");
    }

    #[tokio::test]
    async fn test_read_unmasked_server_frames() {
        let data = vec![
            0x81, 0x05, b'H', b'e', b'l', b'l', b'o', // text "Hello"
            0x89, 0x02, b'p', b'!', // ping "p!"
        ];
        let mut codec = WebSocketCodec::new(MockStream::new(data), &Config::default());

        let first = codec.read_frame().await.unwrap();
        assert_eq!(first.opcode, OpCode::Text);
        assert_eq!(first.payload(), b"Hello");

        let second = codec.read_frame().await.unwrap();
        assert_eq!(second.opcode, OpCode::Ping);
        assert_eq!(second.payload(), b"p!");
    }

    #[tokio::test]
    async fn test_read_rejects_masked_server_frame() {
        let data = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut codec = WebSocketCodec::new(MockStream::new(data), &Config::default());
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::MaskedServerFrame)
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_frame_before_payload() {
        // Header announces 300 bytes; no payload follows.
        let data = vec![0x81, 0x7e, 0x01, 0x2c];
        let config = Config::default().with_limits(Limits::new(256, 1024, 8192));
        let mut codec = WebSocketCodec::new(MockStream::new(data), &config);
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::FrameTooLarge { size: 300, max: 256 })
        ));
    }

    #[tokio::test]
    async fn test_buffered_bytes_are_read_first() {
        let leftover = [0x81, 0x02, b'h', b'i'];
        let rest = vec![0x81, 0x03, b'y', b'o', b'u'];
        let mut codec =
            WebSocketCodec::with_buffered(MockStream::new(rest), &Config::default(), &leftover);
        assert_eq!(codec.buffered(), 4);

        assert_eq!(codec.read_frame().await.unwrap().payload(), b"hi");
        assert_eq!(codec.read_frame().await.unwrap().payload(), b"you");
    }

    #[tokio::test]
    async fn test_small_read_chunks_assemble_large_frame() {
        let mut data = vec![0x81, 0x7e, 0x01, 0x2c];
        data.extend(vec![b'a'; 300]);
        let config = Config::default().with_read_buffer_size(16);
        let mut codec = WebSocketCodec::new(MockStream::new(data), &config);

        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.payload().len(), 300);
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), &Config::default());
        assert!(matches!(
            codec.read_frame().await,
            Err(Error::ConnectionClosed(None))
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_unexpected_eof() {
        let mut codec =
            WebSocketCodec::new(MockStream::new(vec![0x81, 0x05, b'H']), &Config::default());
        let err = codec.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::UnexpectedEof,
                ..
            }
        ));
        assert!(err.is_teardown());
    }

    #[tokio::test]
    async fn test_flush_and_shutdown() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), &Config::default());
        codec.flush().await.unwrap();
        codec.shutdown().await.unwrap();
        assert!(codec.into_inner().shut_down);
    }

    #[tokio::test]
    async fn test_masks_differ_between_frames() {
        let mut codec = WebSocketCodec::new(MockStream::new(vec![]), &Config::default());
        codec.write_frame(&Frame::text("a")).await.unwrap();
        codec.write_frame(&Frame::text("b")).await.unwrap();

        let written = codec.get_ref().written();
        // Each frame: 2 header bytes + 4 mask bytes + 1 payload byte.
        assert_ne!(&written[2..6], &written[9..13]);
    }
}
