/*
    RingKey - the 256-bit keyspace coordinate shared by peers and stored objects.

    Responsibilities:
    `key.rs` defines the hashing function and key representation used throughout the
    DHT. Keys live on a cyclic group Z/2^256 and are compared with the ring (modular)
    distance d(a,b) = min(|a-b|, 2^256-|a-b|), not XOR. XOR is still used, separately,
    to pick a peer's k-bucket index (the classic Kademlia scheme), so this module
    exposes both: `ring_distance` for nearest-ordering and lookup convergence, and
    `differing_bit` for bucket placement.

    Inputs:
    - raw byte strings (user keys, serialized peer descriptors)

    Outputs:
    - 256-bit ring keys
    - ring distances (themselves RingKeys, comparable via Ord)
    - bit positions for bucket indexing
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit coordinate on the DHT ring, stored big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingKey([u8; 32]);

impl RingKey {
    pub const ZERO: RingKey = RingKey([0u8; 32]);
    pub const MAX: RingKey = RingKey([0xFFu8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        RingKey(bytes)
    }

    /// Truncates or zero-pads a slice to 32 bytes.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = data.len().min(32);
        bytes[..len].copy_from_slice(&data[..len]);
        RingKey(bytes)
    }

    /// Hashes arbitrary data into the keyspace with Blake3.
    pub fn hash(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.as_bytes());
        RingKey(bytes)
    }

    pub fn hash_str(s: &str) -> Self {
        Self::hash(s.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// `ring_distance(a, b) = min(|a-b|, 2^256-|a-b|)`, symmetric and bounded by 2^255.
    pub fn ring_distance(&self, other: &RingKey) -> RingKey {
        let fwd = wrapping_sub(&self.0, &other.0);
        let bwd = wrapping_sub(&other.0, &self.0);
        if cmp_be(&fwd, &bwd) == std::cmp::Ordering::Less {
            RingKey(fwd)
        } else {
            RingKey(bwd)
        }
    }

    /// True if `self` is closer to `target` than `other` is; ties broken by raw key order
    /// so `nearest()` is deterministic across equidistant peers.
    pub fn is_closer(&self, other: &RingKey, target: &RingKey) -> bool {
        let d_self = self.ring_distance(target);
        let d_other = other.ring_distance(target);
        match d_self.cmp(&d_other) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self < other,
        }
    }

    /// Position of the highest bit at which `self` and `reference` differ, used to place
    /// a peer in a k-bucket. `None` when the keys are identical.
    pub fn differing_bit(&self, reference: &RingKey) -> Option<u32> {
        let mut xor = [0u8; 32];
        for i in 0..32 {
            xor[i] = self.0[i] ^ reference.0[i];
        }
        let leading = leading_zero_bits(&xor);
        if leading >= 256 {
            None
        } else {
            Some(255 - leading)
        }
    }

    /// Modular midpoint `floor((a+b)/2) mod 2^256`, used to bound a peer's arc of
    /// responsibility. `a+b` can overflow 2^256 (whenever both keys are in the
    /// upper half of the keyspace); the carry bit is folded back into bit 255
    /// after the shift so the result is the true floor-half, not the floor-half
    /// of the truncated sum.
    pub fn midpoint(&self, other: &RingKey) -> RingKey {
        let (sum, overflow) = wrapping_add(&self.0, &other.0);
        let mut half = shift_right_one(&sum);
        if overflow {
            half[0] |= 0x80;
        }
        RingKey(half)
    }

    /// Whether `self` falls in the half-open ring arc `[start, end)`, handling wraparound.
    pub fn in_arc(&self, start: &RingKey, end: &RingKey) -> bool {
        if start == end {
            // Empty arc (isolated peer case in redistribution): contains nothing.
            return false;
        }
        if cmp_be(&start.0, &end.0) == std::cmp::Ordering::Less {
            cmp_be(&start.0, &self.0) != std::cmp::Ordering::Greater
                && cmp_be(&self.0, &end.0) == std::cmp::Ordering::Less
        } else {
            // Arc straddles zero.
            cmp_be(&start.0, &self.0) != std::cmp::Ordering::Greater
                || cmp_be(&self.0, &end.0) == std::cmp::Ordering::Less
        }
    }
}

fn leading_zero_bits(bytes: &[u8; 32]) -> u32 {
    let mut count = 0u32;
    for byte in bytes.iter() {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

fn cmp_be(a: &[u8; 32], b: &[u8; 32]) -> std::cmp::Ordering {
    a.cmp(b)
}

fn wrapping_sub(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow: i16 = 0;
    for i in (0..32).rev() {
        let diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            out[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            out[i] = diff as u8;
            borrow = 0;
        }
    }
    out
}

/// Returns the wrapped sum and whether the true sum overflowed 2^256.
fn wrapping_add(a: &[u8; 32], b: &[u8; 32]) -> ([u8; 32], bool) {
    let mut out = [0u8; 32];
    let mut carry: u16 = 0;
    for i in (0..32).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        out[i] = (sum & 0xFF) as u8;
        carry = sum >> 8;
    }
    (out, carry != 0)
}

fn shift_right_one(bytes: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry = 0u8;
    for i in 0..32 {
        out[i] = (bytes[i] >> 1) | (carry << 7);
        carry = bytes[i] & 1;
    }
    out
}

impl fmt::Debug for RingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RingKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for RingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl PartialOrd for RingKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RingKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<[u8; 32]> for RingKey {
    fn from(bytes: [u8; 32]) -> Self {
        RingKey(bytes)
    }
}

impl From<RingKey> for [u8; 32] {
    fn from(key: RingKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_deterministic() {
        let a = RingKey::hash(b"hello");
        let b = RingKey::hash(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, RingKey::hash(b"world"));
    }

    #[test]
    fn distance_symmetric_and_bounded() {
        let a = RingKey::hash_str("alice");
        let b = RingKey::hash_str("bob");
        assert_eq!(a.ring_distance(&b), b.ring_distance(&a));

        let max_half = RingKey::from_bytes([0x80; 32]); // 2^255 roughly, upper bound check
        assert!(a.ring_distance(&b) <= RingKey::from_bytes([0xFF; 32]));
        let _ = max_half;
    }

    #[test]
    fn distance_self_is_zero() {
        let a = RingKey::hash_str("self");
        assert_eq!(a.ring_distance(&a), RingKey::ZERO);
    }

    #[test]
    fn distance_wraps_around_zero() {
        let near_max = RingKey::from_bytes([0xFF; 32]);
        let near_zero = RingKey::from_bytes([0x00; 32]);
        let mut one = [0u8; 32];
        one[31] = 1;
        let one = RingKey::from_bytes(one);
        // near_max + 1 wraps to 0, so distance(near_max, near_zero+1) should be small.
        let d = near_max.ring_distance(&one);
        assert_eq!(d.as_bytes()[31], 2);
        assert!(d.as_bytes()[..31].iter().all(|b| *b == 0));
        let _ = near_zero;
    }

    #[test]
    fn is_closer_tie_break_is_deterministic() {
        let target = RingKey::from_bytes([0; 32]);
        let mut k1 = [0u8; 32];
        k1[31] = 5;
        let mut k2 = [0u8; 32];
        k2[0] = 0xF0;
        k2[31] = 5 ^ 0xFF; // same ring distance via wraparound symmetry not guaranteed;
        // instead test direct equality tie-break:
        let a = RingKey::from_bytes([1; 32]);
        let b = RingKey::from_bytes([1; 32]);
        assert!(!a.is_closer(&b, &target));
        assert!(!b.is_closer(&a, &target));
        let _ = (k1, k2);
    }

    #[test]
    fn differing_bit_matches_kademlia_bucket_scheme() {
        let reference = RingKey::from_bytes([0; 32]);
        let mut bytes = [0u8; 32];
        bytes[0] = 0b1000_0000;
        assert_eq!(RingKey::from_bytes(bytes).differing_bit(&reference), Some(255));

        let mut bytes = [0u8; 32];
        bytes[31] = 0b0000_0001;
        assert_eq!(RingKey::from_bytes(bytes).differing_bit(&reference), Some(0));

        assert_eq!(reference.differing_bit(&reference), None);
    }

    #[test]
    fn midpoint_is_between_arguments_on_simple_case() {
        let a = RingKey::from_bytes([0; 32]);
        let mut b_bytes = [0u8; 32];
        b_bytes[0] = 0x10;
        let b = RingKey::from_bytes(b_bytes);
        let mid = a.midpoint(&b);
        assert_eq!(mid.as_bytes()[0], 0x08);
    }

    #[test]
    fn midpoint_carries_overflow_bit_when_both_in_upper_half() {
        // Two adjacent upper-half keys: a+b overflows 2^256, so the true
        // midpoint sits in the upper half too, not antipodal at 2^255.
        let a = RingKey::from_bytes([0xF0; 32]);
        let b = RingKey::from_bytes([0xF8; 32]);
        let mid = a.midpoint(&b);
        assert_eq!(mid.as_bytes()[0], 0xF4);
        assert!(mid.as_bytes()[0] & 0x80 != 0, "midpoint of two upper-half keys must stay in the upper half");
    }

    #[test]
    fn midpoint_of_max_and_max_is_max() {
        let max = RingKey::MAX;
        let mid = max.midpoint(&max);
        assert_eq!(mid, RingKey::MAX);
    }

    #[test]
    fn in_arc_basic_and_wrap() {
        let a = RingKey::from_bytes([10; 32]);
        let b = RingKey::from_bytes([20; 32]);
        let mid = RingKey::from_bytes([15; 32]);
        assert!(mid.in_arc(&a, &b));
        assert!(!a.clone().in_arc(&b, &a)); // empty-looking non-wrap check below

        // Wrapping arc: start > end means the arc crosses zero.
        let start = RingKey::from_bytes([250; 32]);
        let end = RingKey::from_bytes([5; 32]);
        let inside = RingKey::from_bytes([0; 32]);
        assert!(inside.in_arc(&start, &end));
        let outside = RingKey::from_bytes([100; 32]);
        assert!(!outside.in_arc(&start, &end));
    }

    #[test]
    fn in_arc_empty_when_bounds_equal() {
        let k = RingKey::hash_str("n");
        assert!(!k.in_arc(&k, &k));
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(a in any::<[u8;32]>(), b in any::<[u8;32]>()) {
            let ka = RingKey::from_bytes(a);
            let kb = RingKey::from_bytes(b);
            prop_assert_eq!(ka.ring_distance(&kb), kb.ring_distance(&ka));
        }

        #[test]
        fn prop_distance_bounded(a in any::<[u8;32]>(), b in any::<[u8;32]>()) {
            let ka = RingKey::from_bytes(a);
            let kb = RingKey::from_bytes(b);
            let bound = RingKey::from_bytes([0x80, 0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,0]);
            prop_assert!(ka.ring_distance(&kb) <= bound);
        }
    }
}
