//! The node's network orchestrator: accepts inbound connections, dials
//! bootstrap peers, dispatches protocol messages, and runs the periodic
//! liveness ping.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use obscura_core::chain::ChainManager;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::NetConfig;
use crate::error::Result;
use crate::message::{CannotAcceptReason, Envelope, Message, WireAddr};
use crate::peer::{Peer, PeerState};
use crate::pool::{KademliaPeerPoolBase, PeerPoolBase};
use crate::session::{Handler, Session};

/// Peers that miss this many consecutive pings are dropped.
const MAX_MISSED_PINGS: u32 = 2;

/// How long a `GetBlock` request waits for a correlated response before the
/// requester gives up.
const BLOCK_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin façade over the shared chain state, handed to every `Host` method
/// that needs to read or mutate it. Kept separate from `ChainManager`
/// itself so the network crate depends on one narrow seam rather than the
/// whole core API surface.
#[derive(Clone)]
pub struct Core {
    chain: Arc<ChainManager>,
}

impl Core {
    pub fn new(chain: Arc<ChainManager>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<ChainManager> {
        &self.chain
    }
}

struct PeerHandler {
    host: Arc<Host>,
    addr: SocketAddr,
}

impl Handler for PeerHandler {
    fn on_receive(&self, bytes: Vec<u8>) {
        self.host.clone().dispatch(self.addr, bytes);
    }

    fn on_close(&self) {
        self.host.drop_peer(&self.addr);
    }
}

pub struct Host {
    config: NetConfig,
    core: Core,
    peers: Mutex<HashMap<SocketAddr, Arc<Peer>>>,
    flat_pool: Mutex<PeerPoolBase>,
    kademlia: Mutex<KademliaPeerPoolBase>,
    missed_pings: Mutex<HashMap<SocketAddr, AtomicU32>>,
    /// Addresses whose rating soured enough to be refused a handshake even
    /// after the underlying TCP session (and any prior `Peer`) is gone.
    banned: Mutex<HashSet<SocketAddr>>,
}

impl Host {
    pub fn new(config: NetConfig, core: Core) -> Arc<Self> {
        let flat_pool = PeerPoolBase::new(config.max_peers);
        let kademlia = KademliaPeerPoolBase::new(config.listen_endpoint, crate::config::NET_KADEMLIA_K);
        Arc::new(Self {
            config,
            core,
            peers: Mutex::new(HashMap::new()),
            flat_pool: Mutex::new(flat_pool),
            kademlia: Mutex::new(kademlia),
            missed_pings: Mutex::new(HashMap::new()),
            banned: Mutex::new(HashSet::new()),
        })
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Binds the listener, spawns the accept loop, dials every bootstrap
    /// endpoint, and runs the periodic ping task. Returns once the listener
    /// fails to bind; the spawned tasks run until the process exits.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_endpoint).await?;
        info!(addr = %self.config.listen_endpoint, "listening for peers");

        let bootstrap = self.config.bootstrap_endpoints.clone();
        for addr in bootstrap {
            let host = self.clone();
            tokio::spawn(async move {
                if let Err(e) = host.dial(addr).await {
                    warn!(%addr, error = %e, "failed to dial bootstrap peer");
                }
            });
        }

        tokio::spawn(self.clone().accept_loop(listener));
        tokio::spawn(self.clone().ping_loop());

        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => self.clone().register_connection(stream, addr),
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    pub async fn dial(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let stream = TcpStream::connect(addr).await?;
        self.register_connection(stream, addr);
        self.send_connect(addr);
        Ok(())
    }

    /// Accepts the raw TCP session and tracks it as a `Peer` in
    /// `JustEstablished` state. Admission (peer-table capacity, rating,
    /// address book placement) is decided during the `Connect`/`Accepted`
    /// handshake below, not here — a bare TCP accept carries no rating or
    /// genesis information yet to decide on.
    fn register_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let handler = Arc::new(PeerHandler { host: self.clone(), addr });
        let session = Session::spawn(stream, addr, handler);
        let peer = Arc::new(Peer::new(addr, session, self.config.initial_peer_rating));
        self.peers.lock().unwrap().insert(addr, peer);
    }

    /// Places `addr` in the address book once a handshake has actually
    /// succeeded: the flat pool always accepts (FIFO eviction), the
    /// Kademlia table may reject a full bucket, in which case the bucket's
    /// stale entry is pinged and evicted if it doesn't answer.
    fn admit_to_address_book(self: &Arc<Self>, addr: SocketAddr) {
        self.flat_pool.lock().unwrap().insert(addr);
        if self.kademlia.lock().unwrap().insert(addr) {
            return;
        }
        let host = self.clone();
        tokio::spawn(async move {
            host.ping_and_maybe_replace_stale(addr).await;
        });
    }

    async fn ping_and_maybe_replace_stale(self: Arc<Self>, new_addr: SocketAddr) {
        let Some(stale_addr) = self.kademlia.lock().unwrap().stale_entry(new_addr) else { return };
        let Some(stale_peer) = self.peers.lock().unwrap().get(&stale_addr).cloned() else {
            self.kademlia.lock().unwrap().replace_stale(new_addr);
            return;
        };
        let answered = stale_peer
            .requests
            .send_and_wait(stale_peer.session(), Message::Ping { nonce: 0 }, BLOCK_REQUEST_TIMEOUT)
            .await
            .is_ok();
        if !answered {
            debug!(%stale_addr, %new_addr, "stale bucket entry did not answer ping, replacing");
            self.kademlia.lock().unwrap().replace_stale(new_addr);
        }
    }

    fn known_peers(&self) -> Vec<WireAddr> {
        self.flat_pool
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| match a {
                SocketAddr::V4(v4) => Some(WireAddr::from(*v4)),
                SocketAddr::V6(_) => None,
            })
            .collect()
    }

    fn send_cannot_accept(&self, peer: &Arc<Peer>, id: u16, reason: CannotAcceptReason) {
        let body = Message::CannotAccept { reason, known_peers: self.known_peers() };
        let _ = peer.session().send(Envelope::new(id, body).to_bytes());
    }

    /// Marks `addr` as banned once its rating has turned sour, so a later
    /// reconnection attempt is refused at the handshake even though the
    /// `Peer` (and its in-memory rating) is long gone.
    fn after_penalty(&self, peer: &Arc<Peer>) {
        if !peer.is_good() {
            self.banned.lock().unwrap().insert(peer.addr());
        }
    }

    /// Broadcasts `msg` to every connected peer.
    pub fn broadcast(&self, msg: Message) {
        self.broadcast_except_impl(None, msg);
    }

    /// Broadcasts `msg` to every connected peer other than `exclude` — used
    /// to relay something just received from `exclude` without echoing it
    /// straight back.
    pub fn broadcast_except(&self, exclude: SocketAddr, msg: Message) {
        self.broadcast_except_impl(Some(exclude), msg);
    }

    fn broadcast_except_impl(&self, exclude: Option<SocketAddr>, msg: Message) {
        let peers: Vec<Arc<Peer>> = self
            .peers
            .lock()
            .unwrap()
            .iter()
            .filter(|(addr, _)| Some(**addr) != exclude)
            .map(|(_, peer)| peer.clone())
            .collect();
        let bytes = Envelope::new(0, msg).to_bytes();
        for peer in peers {
            let _ = peer.session().send(bytes.clone());
        }
    }

    fn send_connect(&self, addr: SocketAddr) {
        if let Some(peer) = self.peers.lock().unwrap().get(&addr).cloned() {
            let body = Message::Connect {
                listen_port: self.config.listen_endpoint.port(),
                genesis_hash: self.genesis_hash(),
            };
            let _ = peer.session().send(Envelope::new(0, body).to_bytes());
        }
    }

    fn genesis_hash(&self) -> obscura_core::Hash {
        // Walk the chain backwards is unnecessary: depth 0's hash is stable
        // and the chain manager always holds it, so the simplest genesis
        // probe is the block at the root of the active path.
        let mut hash = self.core.chain().top_block_hash();
        while let Some(block) = self.core.chain().get_block(&hash) {
            if block.is_genesis() {
                return hash;
            }
            hash = block.prev_block_hash;
        }
        obscura_core::NULL_HASH
    }

    fn dispatch(self: Arc<Self>, addr: SocketAddr, bytes: Vec<u8>) {
        let Some(peer) = self.peers.lock().unwrap().get(&addr).cloned() else { return };

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(%addr, error = %e, "failed to decode message");
                peer.penalize_invalid_message();
                self.after_penalty(&peer);
                return;
            }
        };

        self.handle_message(&peer, envelope);
    }

    fn handle_message(self: Arc<Self>, peer: &Arc<Peer>, envelope: Envelope) {
        // A non-zero id answers some earlier `send_and_wait` call (a
        // correlated `GetBlock`, `Lookup`, or stale-entry `Ping`); if a
        // waiter is registered for it, it owns the reply and the message
        // never falls through to the per-variant handling below.
        if envelope.id != 0 && peer.requests.complete(envelope.id, envelope.body.clone()) {
            return;
        }
        match envelope.body {
            Message::Connect { genesis_hash, .. } => {
                if genesis_hash != self.genesis_hash() {
                    peer.penalize_different_genesis();
                    self.after_penalty(peer);
                    self.send_cannot_accept(peer, envelope.id, CannotAcceptReason::NotAvailable);
                    return;
                }
                if self.banned.lock().unwrap().contains(&peer.addr()) {
                    self.send_cannot_accept(peer, envelope.id, CannotAcceptReason::BadRating);
                    return;
                }
                if self.peer_count() > self.config.max_peers {
                    self.send_cannot_accept(peer, envelope.id, CannotAcceptReason::BucketIsFull);
                    return;
                }
                self.admit_to_address_book(peer.addr());
                let response = Message::Accepted {
                    head_hash: self.core.chain().top_block_hash(),
                    head_depth: self.core.chain().top_block_depth(),
                };
                let _ = peer.session().send(Envelope::new(envelope.id, response).to_bytes());
                peer.set_state(PeerState::RequestedBlocks);
            }
            Message::Accepted { head_hash, head_depth } => {
                self.admit_to_address_book(peer.addr());
                if head_depth > self.core.chain().top_block_depth() {
                    self.clone().request_block(peer.clone(), head_hash);
                    peer.set_state(PeerState::RequestedBlocks);
                } else {
                    peer.set_state(PeerState::Synchronised);
                }
            }
            Message::CannotAccept { known_peers, .. } => {
                for wire in known_peers {
                    self.kademlia.lock().unwrap().insert(SocketAddr::V4(wire.into()));
                }
                self.drop_peer(&peer.addr());
            }
            Message::Ping { nonce } => {
                let _ = peer.session().send(Envelope::new(envelope.id, Message::Pong { nonce }).to_bytes());
            }
            Message::Pong { .. } => {
                self.missed_pings.lock().unwrap().insert(peer.addr(), AtomicU32::new(0));
            }
            Message::Lookup { target, alpha } => {
                let peers = self
                    .kademlia
                    .lock()
                    .unwrap()
                    .lookup(&target, alpha as usize)
                    .into_iter()
                    .filter_map(|a| match a {
                        SocketAddr::V4(v4) => Some(crate::message::WireAddr::from(v4)),
                        SocketAddr::V6(_) => None,
                    })
                    .collect();
                let _ = peer
                    .session()
                    .send(Envelope::new(envelope.id, Message::LookupResponse { peers }).to_bytes());
            }
            Message::LookupResponse { peers } => {
                for wire in peers {
                    let addr = SocketAddr::V4(wire.into());
                    self.kademlia.lock().unwrap().insert(addr);
                }
            }
            Message::Transaction(tx) => {
                let wire_tx = tx.clone();
                match self.core.chain().try_add_transaction(tx) {
                    Ok(true) => self.broadcast_except(peer.addr(), Message::Transaction(wire_tx)),
                    Ok(false) => {}
                    Err(e) => {
                        debug!(peer = %peer.addr(), error = %e, "rejected transaction from peer");
                        peer.penalize_invalid_message();
                        self.after_penalty(peer);
                    }
                }
            }
            Message::GetBlock { hash } => {
                let response = match self.core.chain().get_block(&hash) {
                    Some(block) => Message::Block(block),
                    None => Message::BlockNotFound { hash },
                };
                let _ = peer.session().send(Envelope::new(envelope.id, response).to_bytes());
            }
            Message::Block(block) => {
                let block_hash = block.hash();
                let wire_block = block.clone();
                match peer.receive_block(self.core.chain(), block) {
                    Ok(()) => {
                        // A buffered descendant can still sour the rating
                        // inside `drain_buffer` without surfacing an error
                        // here, so re-check regardless of outcome.
                        self.after_penalty(peer);
                        if self.core.chain().has_block(&block_hash) {
                            self.broadcast_except(peer.addr(), Message::Block(wire_block));
                        }
                    }
                    Err(e) => {
                        debug!(peer = %peer.addr(), error = %e, "block rejected");
                        self.after_penalty(peer);
                    }
                }
            }
            Message::BlockNotFound { .. } => {
                peer.penalize_unexpected_message();
                self.after_penalty(peer);
            }
            Message::Close => {
                self.drop_peer(&peer.addr());
            }
        }
    }

    /// Asks `peer` for `hash`, correlating the reply through its
    /// [`crate::requests::RequestTable`] rather than matching on the next
    /// inbound `Block`. Runs detached so the synchronous dispatch path never
    /// blocks waiting on a network round trip.
    fn request_block(self: Arc<Self>, peer: Arc<Peer>, hash: obscura_core::Hash) {
        tokio::spawn(async move {
            let reply = peer.requests.send_and_wait(peer.session(), Message::GetBlock { hash }, BLOCK_REQUEST_TIMEOUT).await;
            match reply {
                Ok(Message::Block(block)) => {
                    let block_hash = block.hash();
                    let wire_block = block.clone();
                    match peer.receive_block(self.core.chain(), block) {
                        Ok(()) => {
                            self.after_penalty(&peer);
                            if self.core.chain().has_block(&block_hash) {
                                self.broadcast_except(peer.addr(), Message::Block(wire_block));
                            }
                        }
                        Err(e) => {
                            debug!(peer = %peer.addr(), error = %e, "requested block rejected");
                            self.after_penalty(&peer);
                        }
                    }
                }
                Ok(Message::BlockNotFound { .. }) => {
                    debug!(peer = %peer.addr(), %hash, "peer does not have the requested block");
                }
                Ok(_) => {
                    peer.penalize_unexpected_message();
                    self.after_penalty(&peer);
                }
                Err(e) => {
                    debug!(peer = %peer.addr(), error = %e, "get_block request timed out");
                }
            }
        });
    }

    fn drop_peer(&self, addr: &SocketAddr) {
        self.peers.lock().unwrap().remove(addr);
        self.flat_pool.lock().unwrap().remove(addr);
        self.missed_pings.lock().unwrap().remove(addr);
    }

    async fn ping_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.ping_frequency_seconds));
        loop {
            interval.tick().await;
            let addrs: Vec<SocketAddr> = self.peers.lock().unwrap().keys().cloned().collect();
            for addr in addrs {
                self.ping_one(addr);
            }
        }
    }

    fn ping_one(&self, addr: SocketAddr) {
        let Some(peer) = self.peers.lock().unwrap().get(&addr).cloned() else { return };

        let missed = {
            let mut table = self.missed_pings.lock().unwrap();
            let counter = table.entry(addr).or_insert_with(|| AtomicU32::new(0));
            counter.fetch_add(1, Ordering::SeqCst) + 1
        };
        if missed > MAX_MISSED_PINGS {
            warn!(%addr, "peer missed too many pings, dropping");
            self.drop_peer(&addr);
            return;
        }
        let _ = peer.session().send(Envelope::new(0, Message::Ping { nonce: missed as u64 }).to_bytes());
    }
}
