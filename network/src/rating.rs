//! Peer trust scoring: a signed counter that only ever decreases.
//!
//! Starts at [`crate::config::NET_INITIAL_PEER_RATING`]. A peer is
//! considered well-behaved while its rating stays positive; the host
//! disconnects peers whose rating drops to zero or below.

const NON_EXPECTED_MESSAGE_PENALTY: i32 = 5;
const INVALID_MESSAGE_PENALTY: i32 = 10;
const BAD_BLOCK_PENALTY: i32 = 20;
const DIFFERENT_GENESIS_PENALTY: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerRating(i32);

impl PeerRating {
    pub fn new(initial: i32) -> Self {
        Self(initial)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn is_good(&self) -> bool {
        self.0 > 0
    }

    /// The peer sent a message that made no sense given its current
    /// [`crate::peer::PeerState`].
    pub fn non_expected_message(&mut self) {
        self.0 -= NON_EXPECTED_MESSAGE_PENALTY;
    }

    /// A message failed to decode or violated a structural invariant.
    pub fn invalid_message(&mut self) {
        self.0 -= INVALID_MESSAGE_PENALTY;
    }

    /// The peer offered a block that failed PoW or parent validation.
    pub fn bad_block(&mut self) {
        self.0 -= BAD_BLOCK_PENALTY;
    }

    /// The peer's genesis hash does not match ours — effectively an
    /// immediate ban, since no further exchange with it can be useful.
    pub fn different_genesis(&mut self) {
        self.0 -= DIFFERENT_GENESIS_PENALTY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_good_and_degrades_with_penalties() {
        let mut rating = PeerRating::new(100);
        assert!(rating.is_good());
        for _ in 0..21 {
            rating.bad_block();
        }
        assert!(!rating.is_good());
    }

    #[test]
    fn different_genesis_is_a_near_instant_ban() {
        let mut rating = PeerRating::new(100);
        rating.different_genesis();
        assert!(!rating.is_good());
    }
}
