//! Obscura Network
//!
//! The peer-to-peer transport and protocol layer: framed sessions over
//! `tokio`, a hand-rolled message protocol (handshake, block/transaction
//! relay, Kademlia-style peer lookup), per-peer state machines and trust
//! ratings, and the host that ties it all together with the shared chain
//! state from `obscura-core`.

pub mod config;
pub mod error;
pub mod host;
pub mod message;
pub mod peer;
pub mod pool;
pub mod rating;
pub mod requests;
pub mod session;

pub use error::{Error, Result};
