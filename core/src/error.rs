//! Error types for the **Obscura** core crate.
//!
//! All high-level operations return [`crate::Result`] which is a convenient
//! alias for `core::result::Result<T, Error>`.
//!
//! The enum is intentionally minimal and high-level.  Lower-level errors are
//! mapped into one of these variants before bubbling up to callers.
//!
//! # Examples
//!
//! ```
//! use obscura_core::{Error, Result};
//!
//! fn demo_fn(fail: bool) -> Result<()> {
//!     if fail {
//!         Err(Error::InvalidBlock("difficulty target not met"))
//!     } else {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

use crate::archive::ArchiveError;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// Serialization/deserialization failed on a length-prefixed archive.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Signature could not be verified against the provided public key.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Caller violated a precondition (e.g. building an incomplete value).
    #[error("logic error: {0}")]
    LogicError(&'static str),

    /// An argument was structurally invalid (e.g. unknown account on read).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Account already exists where a fresh one was expected.
    #[error("address already exists")]
    AccountExists,

    /// Sender lacks sufficient balance to cover amount + fee.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Block fails PoW or structural validation.
    #[error("invalid block: {0}")]
    InvalidBlock(&'static str),

    /// Block references a parent that is not known locally.
    #[error("unknown parent block")]
    UnknownParent,

    /// Block is structurally and PoW-valid but applying its transactions to
    /// the parent's state snapshot failed.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(&'static str),

    /// Placeholder for errors originating from external crates.
    #[error("{0}")]
    Other(&'static str),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
