//! [`LineSink`] over the write half of a TCP connection.
//!
//! Closing a sink flips a `watch` flag before touching the socket. Both the
//! session's reader task and any write still in flight observe that flag, so
//! a close takes effect immediately even if the peer has stopped reading.

use std::io;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};

use crate::application::dispatch_commands::LineSink;

pub struct TcpLineSink {
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl TcpLineSink {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            writer: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// A receiver that becomes `true` once [`close`](LineSink::close) is called.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl LineSink for TcpLineSink {
    async fn send_line(&self, line: &str) -> io::Result<()> {
        let mut closed = self.closed_signal();
        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };

        tokio::select! {
            result = write => result,
            _ = wait_closed(&mut closed) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "session closed",
            )),
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            // Best effort; the peer may already be gone.
            let _ = writer.shutdown().await;
        }
    }
}

/// Resolves once the flag behind `signal` is `true` or its sender is gone.
pub async fn wait_closed(signal: &mut watch::Receiver<bool>) {
    loop {
        let closed = *signal.borrow_and_update();
        if closed || signal.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::{TcpListener, TcpStream};

    /// The server-side read half is returned so the socket stays open.
    async fn connected_pair() -> (TcpLineSink, OwnedReadHalf, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (read, write) = server.into_split();
        (TcpLineSink::new(write), read, client)
    }

    #[tokio::test]
    async fn test_send_line_reaches_peer() {
        // Arrange
        let (sink, _read, mut peer) = connected_pair().await;

        // Act
        sink.send_line("{\"type\":\"EXEC\",\"id\":1000,\"cmd\":\"x\"}\n")
            .await
            .expect("write must succeed");
        sink.close().await;

        // Assert
        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "{\"type\":\"EXEC\",\"id\":1000,\"cmd\":\"x\"}\n");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (sink, _read, _peer) = connected_pair().await;

        sink.close().await;
        let result = sink.send_line("late\n").await;

        assert!(sink.is_closed());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_signals_observers() {
        let (sink, _read, _peer) = connected_pair().await;
        let mut signal = sink.closed_signal();

        sink.close().await;
        sink.close().await;

        wait_closed(&mut signal).await;
        assert!(*signal.borrow());
    }
}
