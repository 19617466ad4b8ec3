//! Length-prefixed framing over a raw `TcpStream`.
//!
//! Each frame is a `u32` big-endian length followed by that many bytes,
//! capped at [`MAX_FRAME_LEN`]. A `Session` owns the write half behind an
//! unbounded channel drained by a dedicated task, so `send` never blocks the
//! caller on network backpressure; the read half runs its own task that
//! hands decoded frames to a [`Handler`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Maximum accepted frame payload: 16 MiB.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Receives events from a [`Session`]'s read loop.
pub trait Handler: Send + Sync {
    fn on_receive(&self, bytes: Vec<u8>);
    fn on_close(&self);
}

/// A framed, half-duplex-buffered connection to one peer.
pub struct Session {
    peer_addr: std::net::SocketAddr,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
}

impl Session {
    /// Splits `stream`, spawns the read and write tasks, and returns the
    /// shared handle. `handler` is invoked from the read task for every
    /// frame and once more on close.
    pub fn spawn(stream: TcpStream, peer_addr: std::net::SocketAddr, handler: Arc<dyn Handler>) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let session = Arc::new(Self { peer_addr, outbox: tx, closed: AtomicBool::new(false) });

        tokio::spawn(Self::write_loop(write_half, rx));
        tokio::spawn(Self::read_loop(read_half, handler, session.clone()));

        session
    }

    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queues `bytes` for the write task. Errors if the session has
    /// already observed a close.
    pub fn send(&self, bytes: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SendOnClosedConnection);
        }
        self.outbox.send(bytes).map_err(|_| Error::SendOnClosedConnection)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn write_loop(mut write_half: tokio::net::tcp::OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(payload) = rx.recv().await {
            if payload.len() as u64 > MAX_FRAME_LEN as u64 {
                warn!(len = payload.len(), "dropping oversized outbound frame");
                continue;
            }
            let len = (payload.len() as u32).to_be_bytes();
            if write_half.write_all(&len).await.is_err() {
                break;
            }
            if write_half.write_all(&payload).await.is_err() {
                break;
            }
        }
    }

    async fn read_loop(mut read_half: tokio::net::tcp::OwnedReadHalf, handler: Arc<dyn Handler>, session: Arc<Session>) {
        loop {
            let mut len_buf = [0u8; 4];
            if read_half.read_exact(&mut len_buf).await.is_err() {
                break;
            }
            let len = u32::from_be_bytes(len_buf);
            if len > MAX_FRAME_LEN {
                warn!(len, peer = %session.peer_addr, "peer sent oversized frame, closing");
                break;
            }
            let mut payload = vec![0u8; len as usize];
            if read_half.read_exact(&mut payload).await.is_err() {
                break;
            }
            handler.on_receive(payload);
        }
        debug!(peer = %session.peer_addr, "session closed");
        session.mark_closed();
        handler.on_close();
    }
}
