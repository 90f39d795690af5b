//! Frame layer for the sheetd protocol.
//!
//! Every message travels in a frame with a 4-byte header:
//! - Bytes 0..4: payload size (u32 BE)
//!
//! followed by the JSON payload. Frames larger than [`MAX_FRAME_LEN`] are
//! rejected on both send and receive so a corrupt length header cannot make
//! a peer allocate unbounded memory.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::{Request, Response, Result, WireError};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads length-prefixed frames from a stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Receive a complete frame payload.
    pub async fn recv_frame(&mut self) -> Result<Bytes> {
        let mut header = [0u8; 4];
        match self.inner.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(WireError::ConnectionClosed);
            }
            Err(e) => return Err(WireError::Io(e)),
        }

        let size = u32::from_be_bytes(header) as usize;
        if size > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge {
                size,
                max: MAX_FRAME_LEN,
            });
        }
        if size == 0 {
            return Ok(Bytes::new());
        }

        let mut payload = BytesMut::zeroed(size);
        self.inner.read_exact(&mut payload).await?;
        Ok(payload.freeze())
    }

    /// Receive and decode a [`Request`].
    pub async fn recv_request(&mut self) -> Result<Request> {
        let frame = self.recv_frame().await?;
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Receive and decode a [`Response`].
    pub async fn recv_response(&mut self) -> Result<Response> {
        let frame = self.recv_frame().await?;
        Ok(serde_json::from_slice(&frame)?)
    }
}

/// Writes length-prefixed frames to a stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Send a single frame.
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FRAME_LEN {
            return Err(WireError::FrameTooLarge {
                size: data.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let header = (data.len() as u32).to_be_bytes();
        self.inner.write_all(&header).await?;
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Serialize and send a [`Request`].
    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        let data = serde_json::to_vec(request)?;
        self.send_frame(&data).await
    }

    /// Serialize and send a [`Response`].
    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        let data = serde_json::to_vec(response)?;
        self.send_frame(&data).await
    }
}

/// A bidirectional frame transport over a TCP connection.
pub struct Transport {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl Transport {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
        }
    }

    /// Connect to a worker listening on `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            WireError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to connect to sheetd worker at {addr}: {e}"),
            ))
        })?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        self.writer.send_request(request).await
    }

    pub async fn recv_response(&mut self) -> Result<Response> {
        self.reader.recv_response().await
    }

    pub async fn recv_request(&mut self) -> Result<Request> {
        self.reader.recv_request().await
    }

    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        self.writer.send_response(response).await
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use tokio::net::TcpListener;

    async fn pair() -> (Transport, Transport) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            Transport::new(stream)
        });
        let client = Transport::connect("127.0.0.1", addr.port()).await.unwrap();
        let server = accept.await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (mut client, mut server) = pair().await;

        let req = Request::new(42, commands::WORKER_PING);
        client.send_request(&req).await.unwrap();

        let got = server.recv_request().await.unwrap();
        assert_eq!(got.id, 42);
        assert_eq!(got.command, commands::WORKER_PING);

        server
            .send_response(&Response::ok(42, None))
            .await
            .unwrap();
        let resp = client.recv_response().await.unwrap();
        assert_eq!(resp.id, 42);
        assert!(resp.is_ok());
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let (mut client, mut server) = pair().await;
        let (_, mut writer) = client.into_split();
        writer.send_frame(b"").await.unwrap();
        let (mut reader, _) = server.into_split();
        let frame = reader.recv_frame().await.unwrap();
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_frames_in_order() {
        let (mut client, mut server) = pair().await;
        for id in 0..3u64 {
            client
                .send_request(&Request::new(id, commands::BATCH_LIST))
                .await
                .unwrap();
        }
        for id in 0..3u64 {
            let got = server.recv_request().await.unwrap();
            assert_eq!(got.id, id);
        }
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let (client, mut server) = pair().await;
        drop(client);
        match server.recv_request().await {
            Err(WireError::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_send() {
        let (client, _server) = pair().await;
        let (_, mut writer) = client.into_split();
        let huge = vec![0u8; MAX_FRAME_LEN + 1];
        match writer.send_frame(&huge).await {
            Err(WireError::FrameTooLarge { .. }) => {}
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }
}
