//! Error types for the peer protocol.

use thiserror::Error;

use obscura_core::archive::ArchiveError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire message error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("send on closed connection")]
    SendOnClosedConnection,

    #[error("unknown message tag: {0}")]
    UnknownMessageTag(u8),

    #[error("request timed out")]
    Timeout,

    #[error("peer not found")]
    PeerNotFound,

    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    #[error("peer is on a different genesis block")]
    DifferentGenesis,

    #[error("frame exceeds maximum payload size")]
    FrameTooLarge,

    #[error("chain rejected block or transaction: {0}")]
    Core(#[from] obscura_core::Error),

    #[error("peer sync buffer overflowed")]
    SyncBufferOverflow,
}

pub type Result<T> = core::result::Result<T, Error>;
