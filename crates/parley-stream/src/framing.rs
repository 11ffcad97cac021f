//! Length-prefixed framing over async byte streams.
//!
//! Generic over the stream type: works with `TcpStream`, Unix sockets,
//! `tokio::io::duplex` pairs, or any other `AsyncRead + AsyncWrite`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use parley_session::{CancelToken, ReadTransport, Transport, WriteTransport};
use parley_wire::{decode_frame, encode_frame, ErrorCode, Message};

const READ_CHUNK: usize = 4096;

fn io_error_code(error: &io::Error) -> ErrorCode {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorCode::CONNECTION_RESET,
        _ => ErrorCode::FAIL,
    }
}

/// A framed transport over any async byte stream.
///
/// Splitting hands each direction its own half; both halves share the
/// connection's cancellation token and abort pending I/O once it fires.
pub struct StreamTransport<S> {
    stream: S,
    cancel: CancelToken,
}

impl<S> StreamTransport<S> {
    /// Wrap a stream. The cancellation token is replaced by the connection
    /// at `start`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            cancel: CancelToken::new(),
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type ReadHalf = FrameReader<tokio::io::ReadHalf<S>>;
    type WriteHalf = FrameWriter<tokio::io::WriteHalf<S>>;

    fn set_cancellation_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    fn cancellation_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn into_split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        let (read, write) = tokio::io::split(self.stream);
        (
            FrameReader::new(read, self.cancel.clone()),
            FrameWriter::new(write, self.cancel),
        )
    }
}

/// Read half: buffers stream bytes and extracts complete frames.
///
/// A single logical message may arrive across any number of reads; partial
/// frames stay buffered until their payload is complete.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    cancel: CancelToken,
}

impl<R> FrameReader<R> {
    /// Wrap a read half with the cancellation token pending I/O obeys.
    pub fn new(inner: R, cancel: CancelToken) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            cancel,
        }
    }
}

impl<R> ReadTransport for FrameReader<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    async fn read(&mut self) -> Result<Message, ErrorCode> {
        loop {
            if let Some((message, consumed)) = decode_frame(&self.buf) {
                self.buf.drain(..consumed);
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let cancel = self.cancel.clone();
            let n = tokio::select! {
                _ = cancel.cancelled() => return Err(ErrorCode::ABORT),
                result = self.inner.read(&mut chunk) => {
                    result.map_err(|error| io_error_code(&error))?
                }
            };
            if n == 0 {
                return Err(ErrorCode::CONNECTION_RESET);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Write half: frames one message per write, reusing a scratch buffer.
pub struct FrameWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    cancel: CancelToken,
}

impl<W> FrameWriter<W> {
    /// Wrap a write half with the cancellation token pending I/O obeys.
    pub fn new(inner: W, cancel: CancelToken) -> Self {
        Self {
            inner,
            scratch: Vec::with_capacity(1024),
            cancel,
        }
    }
}

impl<W> WriteTransport for FrameWriter<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn write(&mut self, message: Message) -> Result<(), ErrorCode> {
        self.scratch.clear();
        encode_frame(&message, &mut self.scratch);

        let cancel = self.cancel.clone();
        let inner = &mut self.inner;
        let scratch = &self.scratch;
        tokio::select! {
            _ = cancel.cancelled() => Err(ErrorCode::ABORT),
            result = async move {
                inner.write_all(scratch).await?;
                inner.flush().await
            } => result.map_err(|error| io_error_code(&error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_wire::{CallType, MessageHeader, MethodId};
    use std::time::Duration;
    use tokio::io::duplex;

    fn message(call_id: u32, payload: Vec<u8>) -> Message {
        Message::new(
            MessageHeader::new(call_id, CallType::Request, MethodId::from_name("echo")),
            payload,
        )
    }

    fn split_pair(
        buffer: usize,
    ) -> (
        (
            FrameReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
            FrameWriter<tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        ),
        (
            FrameReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
            FrameWriter<tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        ),
    ) {
        let (left, right) = duplex(buffer);
        (
            StreamTransport::new(left).into_split(),
            StreamTransport::new(right).into_split(),
        )
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let ((mut reader, _w), (_r, mut writer)) = split_pair(64 * 1024);

        let sent = message(7, vec![1, 2, 3, 4]);
        writer.write(sent.clone()).await.unwrap();
        let received = reader.read().await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn large_payload_spans_many_reads() {
        let ((mut reader, _w), (_r, mut writer)) = split_pair(512);

        let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let sent = message(9, payload);

        let send = {
            let sent = sent.clone();
            tokio::spawn(async move { writer.write(sent).await })
        };
        let received = reader.read().await.unwrap();
        send.await.unwrap().unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn back_to_back_frames_are_separated() {
        let ((mut reader, _w), (_r, mut writer)) = split_pair(64 * 1024);

        writer.write(message(1, vec![0xAA])).await.unwrap();
        writer.write(message(2, Vec::new())).await.unwrap();
        writer.write(message(3, vec![0xBB; 100])).await.unwrap();

        assert_eq!(reader.read().await.unwrap().header.call_id, 1);
        let second = reader.read().await.unwrap();
        assert_eq!(second.header.call_id, 2);
        assert!(second.payload.is_empty());
        assert_eq!(reader.read().await.unwrap().payload.len(), 100);
    }

    #[tokio::test]
    async fn eof_maps_to_connection_reset() {
        let ((mut reader, _w), peer) = split_pair(1024);
        drop(peer);

        assert_eq!(reader.read().await.unwrap_err(), ErrorCode::CONNECTION_RESET);
    }

    #[tokio::test]
    async fn eof_mid_frame_maps_to_connection_reset() {
        let (left, mut right) = duplex(1024);
        let (mut reader, _w) = StreamTransport::new(left).into_split();

        // A frame prefix promising more payload than ever arrives.
        let mut bytes = Vec::new();
        encode_frame(&message(5, vec![1, 2, 3, 4, 5, 6]), &mut bytes);
        right.write_all(&bytes[..bytes.len() - 3]).await.unwrap();
        drop(right);

        assert_eq!(reader.read().await.unwrap_err(), ErrorCode::CONNECTION_RESET);
    }

    #[tokio::test]
    async fn cancellation_aborts_a_pending_read() {
        let (left, _right) = duplex(1024);
        let mut transport = StreamTransport::new(left);
        let cancel = CancelToken::new();
        transport.set_cancellation_token(cancel.clone());
        let (mut reader, _writer) = transport.into_split();

        let pending = tokio::spawn(async move { reader.read().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("read must abort")
            .expect("read task must not panic");
        assert_eq!(result.unwrap_err(), ErrorCode::ABORT);
    }
}
