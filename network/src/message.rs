//! The peer wire protocol: a tagged message enum, each variant encoded as a
//! `u8` tag followed by its payload, using the same archive codec as every
//! consensus type rather than a separate schema.
//!
//! Every message travels wrapped in an [`Envelope`] carrying a 16-bit
//! correlation id so [`crate::requests::RequestTable`] can match responses
//! back to the request that triggered them. Messages with no natural
//! response (`Ping`, `Transaction`, `Close`, ...) still carry an id; callers
//! that don't expect a reply simply never register one.

use obscura_core::archive::{Decode, Encode, IArchive, OArchive};
use obscura_core::block::Block;
use obscura_core::transaction::Transaction;
use obscura_core::Hash;

use crate::error::{Error, Result};
use crate::pool::NodeId;

/// An IPv4 socket address as carried on the wire — the Kademlia lookup
/// response needs to serialize peer endpoints, and the archive format has
/// no built-in notion of `SocketAddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireAddr {
    pub ip: [u8; 4],
    pub port: u16,
}

impl From<std::net::SocketAddrV4> for WireAddr {
    fn from(addr: std::net::SocketAddrV4) -> Self {
        Self { ip: addr.ip().octets(), port: addr.port() }
    }
}

impl From<WireAddr> for std::net::SocketAddrV4 {
    fn from(addr: WireAddr) -> Self {
        std::net::SocketAddrV4::new(std::net::Ipv4Addr::from(addr.ip), addr.port)
    }
}

impl Encode for WireAddr {
    fn encode(&self, oa: &mut OArchive) {
        oa.write_raw(&self.ip);
        oa.write_u16(self.port);
    }
}

impl Decode for WireAddr {
    fn decode(ia: &mut IArchive) -> obscura_core::archive::Result<Self> {
        let raw = ia.read_raw(4)?;
        let mut ip = [0u8; 4];
        ip.copy_from_slice(raw);
        let port = ia.read_u16()?;
        Ok(Self { ip, port })
    }
}

/// Why a handshake was rejected, sent back inside `CannotAccept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannotAcceptReason {
    /// Generic rejection — e.g. an incompatible genesis block.
    NotAvailable,
    /// The local peer table (or the bucket this peer would land in) is full.
    BucketIsFull,
    /// This address is remembered as having misbehaved previously.
    BadRating,
}

impl CannotAcceptReason {
    fn encode(self, oa: &mut OArchive) {
        oa.write_u8(match self {
            CannotAcceptReason::NotAvailable => 0,
            CannotAcceptReason::BucketIsFull => 1,
            CannotAcceptReason::BadRating => 2,
        });
    }

    fn decode(ia: &mut IArchive) -> Result<Self> {
        Ok(match ia.read_u8()? {
            0 => CannotAcceptReason::NotAvailable,
            1 => CannotAcceptReason::BucketIsFull,
            2 => CannotAcceptReason::BadRating,
            other => return Err(Error::UnknownMessageTag(other)),
        })
    }
}

/// The peer protocol's message set, per the state table governing
/// [`crate::peer::PeerState`] transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// First message sent on a fresh connection: announces the sender's
    /// listen port and genesis hash so the receiver can reject peers on an
    /// incompatible network before doing anything else.
    Connect { listen_port: u16, genesis_hash: Hash },
    /// Sent instead of `Accepted` when the handshake is rejected. Carries a
    /// fallback set of known peers so the rejected side still has somewhere
    /// to continue discovery from.
    CannotAccept { reason: CannotAcceptReason, known_peers: Vec<WireAddr> },
    /// Handshake accepted: announces the current chain tip.
    Accepted { head_hash: Hash, head_depth: u64 },
    Ping { nonce: u64 },
    Pong { nonce: u64 },
    /// Kademlia-style "who is near `target`" query.
    Lookup { target: NodeId, alpha: u8 },
    LookupResponse { peers: Vec<WireAddr> },
    Transaction(Transaction),
    GetBlock { hash: Hash },
    Block(Block),
    BlockNotFound { hash: Hash },
    Close,
}

impl Message {
    fn tag(&self) -> u8 {
        match self {
            Message::Connect { .. } => 0,
            Message::CannotAccept { .. } => 1,
            Message::Accepted { .. } => 2,
            Message::Ping { .. } => 3,
            Message::Pong { .. } => 4,
            Message::Lookup { .. } => 5,
            Message::LookupResponse { .. } => 6,
            Message::Transaction(_) => 7,
            Message::GetBlock { .. } => 8,
            Message::Block(_) => 9,
            Message::BlockNotFound { .. } => 10,
            Message::Close => 11,
        }
    }
}

impl Encode for Message {
    fn encode(&self, oa: &mut OArchive) {
        oa.write_u8(self.tag());
        match self {
            Message::Connect { listen_port, genesis_hash } => {
                oa.write_u16(*listen_port);
                oa.write_raw(genesis_hash);
            }
            Message::CannotAccept { reason, known_peers } => {
                reason.encode(oa);
                oa.write_seq(known_peers, |oa, p| p.encode(oa));
            }
            Message::Accepted { head_hash, head_depth } => {
                oa.write_raw(head_hash);
                oa.write_u64(*head_depth);
            }
            Message::Ping { nonce } => oa.write_u64(*nonce),
            Message::Pong { nonce } => oa.write_u64(*nonce),
            Message::Lookup { target, alpha } => {
                oa.write_raw(target);
                oa.write_u8(*alpha);
            }
            Message::LookupResponse { peers } => oa.write_seq(peers, |oa, p| p.encode(oa)),
            Message::Transaction(tx) => tx.encode(oa),
            Message::GetBlock { hash } => oa.write_raw(hash),
            Message::Block(block) => block.encode(oa),
            Message::BlockNotFound { hash } => oa.write_raw(hash),
            Message::Close => {}
        }
    }
}

impl Message {
    pub fn decode(ia: &mut IArchive) -> Result<Self> {
        let tag = ia.read_u8()?;
        Ok(match tag {
            0 => {
                let listen_port = ia.read_u16()?;
                let genesis_hash: Hash = Decode::decode(ia)?;
                Message::Connect { listen_port, genesis_hash }
            }
            1 => {
                let reason = CannotAcceptReason::decode(ia)?;
                let known_peers = ia.read_seq(WireAddr::decode)?;
                Message::CannotAccept { reason, known_peers }
            }
            2 => {
                let head_hash: Hash = Decode::decode(ia)?;
                let head_depth = ia.read_u64()?;
                Message::Accepted { head_hash, head_depth }
            }
            3 => Message::Ping { nonce: ia.read_u64()? },
            4 => Message::Pong { nonce: ia.read_u64()? },
            5 => {
                let target: NodeId = Decode::decode(ia)?;
                let alpha = ia.read_u8()?;
                Message::Lookup { target, alpha }
            }
            6 => Message::LookupResponse { peers: ia.read_seq(WireAddr::decode)? },
            7 => Message::Transaction(Transaction::decode(ia)?),
            8 => {
                let hash: Hash = Decode::decode(ia)?;
                Message::GetBlock { hash }
            }
            9 => Message::Block(Block::decode(ia)?),
            10 => {
                let hash: Hash = Decode::decode(ia)?;
                Message::BlockNotFound { hash }
            }
            11 => Message::Close,
            other => return Err(Error::UnknownMessageTag(other)),
        })
    }
}

/// A message plus the correlation id used to match responses to requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: u16,
    pub body: Message,
}

impl Envelope {
    pub fn new(id: u16, body: Message) -> Self {
        Self { id, body }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut oa = OArchive::new();
        oa.write_u16(self.id);
        self.body.encode(&mut oa);
        oa.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut ia = IArchive::new(bytes);
        let id = ia.read_u16()?;
        let body = Message::decode(&mut ia)?;
        ia.finish()?;
        Ok(Self { id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips() {
        let envelope = Envelope::new(42, Message::Ping { nonce: 7 });
        let bytes = envelope.to_bytes();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn lookup_response_round_trips() {
        let peers = vec![
            WireAddr { ip: [127, 0, 0, 1], port: 7777 },
            WireAddr { ip: [10, 0, 0, 2], port: 9000 },
        ];
        let envelope = Envelope::new(1, Message::LookupResponse { peers });
        let bytes = envelope.to_bytes();
        assert_eq!(envelope, Envelope::from_bytes(&bytes).unwrap());
    }

    #[test]
    fn cannot_accept_carries_reason_and_fallback_peers() {
        let envelope = Envelope::new(
            7,
            Message::CannotAccept {
                reason: CannotAcceptReason::BucketIsFull,
                known_peers: vec![WireAddr { ip: [127, 0, 0, 1], port: 7777 }],
            },
        );
        let bytes = envelope.to_bytes();
        assert_eq!(envelope, Envelope::from_bytes(&bytes).unwrap());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut oa = OArchive::new();
        oa.write_u16(0);
        oa.write_u8(200);
        let bytes = oa.into_bytes();
        assert!(matches!(Envelope::from_bytes(&bytes), Err(Error::UnknownMessageTag(200))));
    }
}
