//! Network-layer tunables. Kept separate from [`obscura_core::config::Config`]
//! since these are host/transport parameters, not consensus parameters.

use std::net::SocketAddr;

/// Default seconds between keep-alive pings sent to each connected peer.
pub const NET_PING_FREQUENCY: u64 = 15;

/// Starting value handed to [`crate::rating::PeerRating::new`] for a freshly
/// connected peer.
pub const NET_INITIAL_PEER_RATING: i32 = 100;

/// Default cap on simultaneously connected peers.
pub const NET_MAX_PEERS: usize = 32;

/// Bucket capacity (`k`) for [`crate::pool::KademliaPeerPoolBase`].
pub const NET_KADEMLIA_K: usize = 20;

#[derive(Debug, Clone)]
pub struct NetConfig {
    pub listen_endpoint: SocketAddr,
    pub bootstrap_endpoints: Vec<SocketAddr>,
    pub max_peers: usize,
    pub ping_frequency_seconds: u64,
    pub initial_peer_rating: i32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            listen_endpoint: "0.0.0.0:7777".parse().expect("valid default listen address"),
            bootstrap_endpoints: Vec::new(),
            max_peers: NET_MAX_PEERS,
            ping_frequency_seconds: NET_PING_FREQUENCY,
            initial_peer_rating: NET_INITIAL_PEER_RATING,
        }
    }
}
