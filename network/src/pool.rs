//! Peer address bookkeeping: a flat bounded pool plus a Kademlia-flavored
//! bucket table for directed lookups.
//!
//! Neither pool stores live connections — they track known *endpoints* and
//! (for the Kademlia table) the node id each bucket is keyed on. The
//! `Host` cross-references these against its live `Peer` map.

use std::net::SocketAddr;

use obscura_core::crypto;

/// A Kademlia node id: 160 bits, one per bucket, per the routing table's
/// bucket count below. Also the wire type of [`crate::message::Message::Lookup`]'s
/// `target` field, so a lookup target and a bucket key are the same shape.
pub type NodeId = [u8; 20];

/// A plain, insertion-ordered, capacity-bounded set of known endpoints.
/// Eviction is FIFO once full — oldest known address makes room for a
/// newly learned one.
#[derive(Debug, Default)]
pub struct PeerPoolBase {
    capacity: usize,
    entries: Vec<SocketAddr>,
}

impl PeerPoolBase {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.entries.contains(addr)
    }

    /// Inserts `addr`, evicting the oldest entry if at capacity. No-op if
    /// already present.
    pub fn insert(&mut self, addr: SocketAddr) {
        if self.contains(&addr) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(addr);
    }

    pub fn remove(&mut self, addr: &SocketAddr) {
        self.entries.retain(|a| a != addr);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SocketAddr> {
        self.entries.iter()
    }
}

/// A peer's node id is `ripemd160(addr.to_string())` — a 160-bit identifier,
/// matching the bit width the bucket table is organized around.
fn node_id(addr: &SocketAddr) -> NodeId {
    crypto::ripemd160(addr.to_string().as_bytes())
}

fn xor_distance(a: &NodeId, b: &NodeId) -> NodeId {
    let mut out = [0u8; 20];
    for i in 0..20 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Index of the most significant set bit in `distance`, counting from the
/// most significant bit of byte 0 (bucket 0) down to the least significant
/// bit of byte 19 (bucket 159). Distance zero (identical id) has no bucket.
fn bucket_index(distance: &NodeId) -> Option<usize> {
    for (byte_idx, byte) in distance.iter().enumerate() {
        if *byte != 0 {
            let leading = byte.leading_zeros() as usize;
            return Some(byte_idx * 8 + leading);
        }
    }
    None
}

/// One bucket per bit of a 160-bit node id.
const BUCKET_COUNT: usize = 160;

/// A simplified Kademlia routing table: `BUCKET_COUNT` buckets indexed by
/// XOR-distance bit-length from `self_id`, each holding up to `k` entries
/// with ping-and-evict insertion (the LRU-most entry is kept unless it
/// fails to answer — callers drive eviction via [`KademliaPeerPoolBase::replace_stale`],
/// since only the host's live session state knows whether a ping
/// succeeded).
#[derive(Debug)]
pub struct KademliaPeerPoolBase {
    self_id: NodeId,
    k: usize,
    buckets: Vec<Vec<SocketAddr>>,
}

impl KademliaPeerPoolBase {
    pub fn new(self_addr: SocketAddr, k: usize) -> Self {
        Self { self_id: node_id(&self_addr), k, buckets: vec![Vec::new(); BUCKET_COUNT] }
    }

    fn bucket_for(&self, addr: &SocketAddr) -> usize {
        let id = node_id(addr);
        let distance = xor_distance(&self.self_id, &id);
        bucket_index(&distance).unwrap_or(0)
    }

    /// Inserts `addr` into its bucket. Returns `false` (without inserting)
    /// if the bucket is already full — the caller should ping the bucket's
    /// least-recently-seen entry and call [`KademliaPeerPoolBase::replace_stale`]
    /// if it doesn't answer.
    pub fn insert(&mut self, addr: SocketAddr) -> bool {
        let idx = self.bucket_for(&addr);
        let bucket = &mut self.buckets[idx];
        if bucket.contains(&addr) {
            return true;
        }
        if bucket.len() >= self.k {
            return false;
        }
        bucket.push(addr);
        true
    }

    /// Returns the oldest entry in `addr`'s bucket — the one
    /// [`KademliaPeerPoolBase::replace_stale`] would evict — or `None` if
    /// that bucket has room and `insert` would simply have succeeded.
    pub fn stale_entry(&self, addr: SocketAddr) -> Option<SocketAddr> {
        let idx = self.bucket_for(&addr);
        let bucket = &self.buckets[idx];
        if bucket.len() >= self.k {
            bucket.first().copied()
        } else {
            None
        }
    }

    /// Evicts the bucket's oldest entry and inserts `addr` in its place —
    /// called once the host confirms the oldest entry failed to answer a
    /// liveness ping.
    pub fn replace_stale(&mut self, addr: SocketAddr) {
        let idx = self.bucket_for(&addr);
        let bucket = &mut self.buckets[idx];
        if !bucket.is_empty() {
            bucket.remove(0);
        }
        bucket.push(addr);
    }

    /// Returns up to `alpha` peers whose node id is closest to `target`,
    /// ties broken by insertion order within and across buckets.
    pub fn lookup(&self, target: &NodeId, alpha: usize) -> Vec<SocketAddr> {
        let mut candidates: Vec<(NodeId, SocketAddr)> = self
            .buckets
            .iter()
            .flatten()
            .map(|addr| (xor_distance(target, &node_id(addr)), *addr))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        candidates.into_iter().take(alpha).map(|(_, addr)| addr).collect()
    }

    pub fn total_len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_pool_evicts_oldest_when_full() {
        let mut pool = PeerPoolBase::new(2);
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        let c: SocketAddr = "127.0.0.1:3".parse().unwrap();
        pool.insert(a);
        pool.insert(b);
        pool.insert(c);
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&a));
        assert!(pool.contains(&c));
    }

    #[test]
    fn kademlia_lookup_returns_closest_by_xor_distance() {
        let self_addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut table = KademliaPeerPoolBase::new(self_addr, 20);
        let candidates: Vec<SocketAddr> = (1..10).map(|p| format!("127.0.0.1:{p}").parse().unwrap()).collect();
        for addr in &candidates {
            table.insert(*addr);
        }
        let target = node_id(&candidates[3]);
        let closest = table.lookup(&target, 1);
        assert_eq!(closest[0], candidates[3]);
    }

    #[test]
    fn full_bucket_rejects_insert_until_replace_stale() {
        let self_addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut table = KademliaPeerPoolBase::new(self_addr, 1);
        // Two far-apart ports will very likely land in different buckets;
        // to force a collision we target the same bucket explicitly by
        // reusing bucket_for's output.
        let a: SocketAddr = "10.0.0.1:1".parse().unwrap();
        let idx = table.bucket_for(&a);
        // find another address landing in the same bucket as `a`
        let mut b = None;
        for p in 2..2000u16 {
            let candidate: SocketAddr = format!("10.0.0.{}:{}", p % 250 + 1, p).parse().unwrap();
            if table.bucket_for(&candidate) == idx && candidate != a {
                b = Some(candidate);
                break;
            }
        }
        let b = b.expect("a colliding address exists within the search space");

        assert!(table.insert(a));
        assert!(!table.insert(b));
        table.replace_stale(b);
        assert_eq!(table.buckets[idx], vec![b]);
    }
}
