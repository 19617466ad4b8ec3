//! Proof-of-Work helpers.
//!
//! The authoritative check is a target comparison — a block hash is valid
//! iff it is numerically below a fixed 32-byte target (compared as a
//! big-endian integer, Bitcoin-style), per [`crate::config::Config::pow_target`].
//! `target_from_difficulty` is a convenience constructor expressing a target
//! as a leading-zero-bit count, used by [`crate::config::Config::default`]
//! and by tests.
//!
//! All functions are pure and stateless so they can be used from any thread.

use crate::Hash;

/// Returns `true` if `hash` is numerically below `target`, both compared as
/// big-endian 256-bit integers.
pub fn hash_meets_target(hash: &Hash, target: &Hash) -> bool {
    hash.as_slice() < target.as_slice()
}

/// Builds a 32-byte target expressing "at least `difficulty` leading zero
/// bits" (0-256). `difficulty == 0` produces the maximal target (everything
/// passes); `difficulty == 256` produces the all-zero target (nothing but
/// the all-zero hash passes).
pub fn target_from_difficulty(difficulty: u32) -> Hash {
    let difficulty = difficulty.min(256);
    let mut target = [0xFFu8; 32];
    let zero_bytes = (difficulty / 8) as usize;
    let zero_bits = (difficulty % 8) as u8;

    for byte in target.iter_mut().take(zero_bytes) {
        *byte = 0;
    }
    if zero_bytes < 32 && zero_bits > 0 {
        target[zero_bytes] = 0xFFu8 >> zero_bits;
    }
    target
}

/// Convenience wrapper combining [`target_from_difficulty`] and
/// [`hash_meets_target`], mirroring the leading-zero-bit framing used in
/// earlier iterations of this consensus rule.
pub fn hash_meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash_meets_target(hash, &target_from_difficulty(difficulty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_difficulty_accepts_anything() {
        let hash = [0xFFu8; 32];
        assert!(hash_meets_difficulty(&hash, 0));
    }

    #[test]
    fn one_byte_difficulty_requires_leading_zero_byte() {
        let mut hash = [0xAAu8; 32];
        assert!(!hash_meets_difficulty(&hash, 8));
        hash[0] = 0;
        assert!(hash_meets_difficulty(&hash, 8));
    }

    #[test]
    fn partial_bit_difficulty() {
        let mut hash = [0u8; 32];
        hash[0] = 0x0F; // top 4 bits zero
        assert!(hash_meets_difficulty(&hash, 4));
        assert!(!hash_meets_difficulty(&hash, 5));
    }

    #[test]
    fn target_comparison_is_lexicographic_big_endian() {
        let target = target_from_difficulty(8);
        let low = [0u8; 32];
        let high = [0xFFu8; 32];
        assert!(hash_meets_target(&low, &target));
        assert!(!hash_meets_target(&high, &target));
    }
}
