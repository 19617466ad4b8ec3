//! Per-peer protocol state: the handshake state machine, the block
//! synchronizer that tolerates out-of-order delivery, and the rating/request
//! bookkeeping hung off each connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use obscura_core::block::Block;
use obscura_core::chain::ChainManager;
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::{Envelope, Message};
use crate::rating::PeerRating;
use crate::requests::RequestTable;
use crate::session::Session;

/// Upper bound on blocks buffered while waiting for an ancestor to arrive.
/// Exceeding it marks the peer as misbehaving — a well-behaved peer streams
/// blocks close to chain order.
const MAX_SYNC_BUFFER: usize = 64;

/// Position in the post-handshake lifecycle. Transitions are driven by
/// [`crate::message::Message`] arrivals — see the network session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// TCP connected, `Connect`/`Accepted` exchanged, nothing else yet.
    JustEstablished,
    /// We've asked for blocks to catch up to this peer's announced depth.
    RequestedBlocks,
    /// Caught up; blocks now arrive and are applied as they're produced.
    Synchronised,
}

/// One connected peer: its session, protocol state, trust rating, request
/// correlation table, and out-of-order block buffer.
pub struct Peer {
    addr: SocketAddr,
    session: Arc<Session>,
    state: Mutex<PeerState>,
    rating: Mutex<PeerRating>,
    pub requests: RequestTable,
    pending_blocks: Mutex<BTreeMap<u64, Block>>,
}

impl Peer {
    pub fn new(addr: SocketAddr, session: Arc<Session>, initial_rating: i32) -> Self {
        Self {
            addr,
            session,
            state: Mutex::new(PeerState::JustEstablished),
            rating: Mutex::new(PeerRating::new(initial_rating)),
            requests: RequestTable::new(),
            pending_blocks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn rating_value(&self) -> i32 {
        self.rating.lock().unwrap().value()
    }

    pub fn is_good(&self) -> bool {
        self.rating.lock().unwrap().is_good()
    }

    pub fn penalize_unexpected_message(&self) {
        self.rating.lock().unwrap().non_expected_message();
    }

    pub fn penalize_invalid_message(&self) {
        self.rating.lock().unwrap().invalid_message();
    }

    pub fn penalize_bad_block(&self) {
        self.rating.lock().unwrap().bad_block();
    }

    pub fn penalize_different_genesis(&self) {
        self.rating.lock().unwrap().different_genesis();
    }

    /// Feeds a freshly received block into the synchronizer: applies it
    /// immediately if its parent is already known, otherwise requests the
    /// missing ancestor and buffers it until that arrives. Once applied,
    /// drains any buffered descendants that are now applicable. A block
    /// that fails to apply, and a buffer overflow, are both treated as
    /// misbehavior.
    pub fn receive_block(&self, chain: &ChainManager, block: Block) -> Result<()> {
        if chain.has_block(&block.prev_block_hash) || block.is_genesis() {
            if let Err(e) = chain.try_add_block(block) {
                self.penalize_bad_block();
                return Err(e.into());
            }
            self.drain_buffer(chain);
            return Ok(());
        }

        let prev_hash = block.prev_block_hash;
        let mut buffer = self.pending_blocks.lock().unwrap();
        if buffer.len() >= MAX_SYNC_BUFFER {
            drop(buffer);
            self.penalize_bad_block();
            warn!(peer = %self.addr, "sync buffer overflowed, penalizing peer");
            return Err(Error::SyncBufferOverflow);
        }
        buffer.insert(block.depth, block);
        drop(buffer);
        let _ = self.session.send(Envelope::new(0, Message::GetBlock { hash: prev_hash }).to_bytes());
        Ok(())
    }

    fn drain_buffer(&self, chain: &ChainManager) {
        loop {
            let next = {
                let buffer = self.pending_blocks.lock().unwrap();
                buffer
                    .iter()
                    .find(|(_, block)| chain.has_block(&block.prev_block_hash))
                    .map(|(depth, block)| (*depth, block.clone()))
            };
            let Some((depth, block)) = next else { break };
            self.pending_blocks.lock().unwrap().remove(&depth);
            if let Err(e) = chain.try_add_block(block) {
                warn!(peer = %self.addr, error = %e, "buffered block rejected");
                self.penalize_bad_block();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    struct NullHandler;
    impl crate::session::Handler for NullHandler {
        fn on_receive(&self, _bytes: Vec<u8>) {}
        fn on_close(&self) {}
    }

    async fn loopback_peer() -> Peer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, client) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (stream, peer_addr) = accepted.unwrap();
        let _keep_client_alive = client.unwrap();
        let session = Session::spawn(stream, peer_addr, Arc::new(NullHandler));
        Peer::new(peer_addr, session, 100)
    }

    #[tokio::test]
    async fn fresh_peer_starts_just_established_and_good() {
        let peer = loopback_peer().await;
        assert_eq!(peer.state(), PeerState::JustEstablished);
        assert!(peer.is_good());
    }

    #[tokio::test]
    async fn enough_bad_blocks_turns_rating_sour() {
        let peer = loopback_peer().await;
        for _ in 0..21 {
            peer.penalize_bad_block();
        }
        assert!(!peer.is_good());
    }

    #[tokio::test]
    async fn state_transitions_are_observable() {
        let peer = loopback_peer().await;
        peer.set_state(PeerState::RequestedBlocks);
        assert_eq!(peer.state(), PeerState::RequestedBlocks);
        peer.set_state(PeerState::Synchronised);
        assert_eq!(peer.state(), PeerState::Synchronised);
    }
}
