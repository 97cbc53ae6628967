//! Hash primitives (C1): double-SHA-256, byte reversal, compact target
//! decoding and difficulty-1 comparison. Kept free of any networking or job
//! concerns so each function is independently testable against the wire's
//! literal test vectors.
use {
    bitcoin::hashes::{Hash, sha256d},
    primitive_types::U256,
    std::sync::LazyLock,
};

/// `0x00000000FFFF0000000000000000000000000000000000000000000000000000`,
/// the denominator difficulty is expressed against.
pub static DIFFICULTY_1_TARGET: LazyLock<U256> = LazyLock::new(|| {
    let mut bytes = [0u8; 32];
    bytes[4..6].copy_from_slice(&[0xff, 0xff]);
    U256::from_big_endian(&bytes)
});

/// SHA-256 applied twice, the second invocation consuming the first's
/// 32-byte digest.
pub fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(bytes).to_byte_array()
}

/// Byte-reversed copy, used both to derive the little-endian Merkle root
/// written into the header and to turn a digest into its big-endian integer
/// form for target comparison.
pub fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Decodes a 4-byte big-endian compact target (`nbits`): a one-byte exponent
/// and three-byte coefficient, `target = coefficient * 2^(8*(exponent-3))`.
/// Returns zero if the input isn't exactly 4 bytes, which forces every
/// candidate hash to fail comparison rather than panicking on malformed
/// input.
pub fn decode_compact_target(nbits: &[u8]) -> U256 {
    if nbits.len() != 4 {
        return U256::zero();
    }

    let exponent = nbits[0] as i32;
    let coefficient = U256::from_big_endian(&[0, nbits[1], nbits[2], nbits[3]]);

    let shift = 8 * (exponent - 3);

    if shift >= 0 {
        let shift = shift as usize;
        if shift >= 256 {
            U256::zero()
        } else {
            coefficient.checked_shl(shift as u32).unwrap_or(U256::zero())
        }
    } else {
        let shift = (-shift) as usize;
        if shift >= 256 {
            U256::zero()
        } else {
            coefficient >> shift
        }
    }
}

/// `difficulty = floor(difficulty_1_target / H)`, with `H = 0` mapping to a
/// difficulty of `0` rather than dividing by zero.
pub fn difficulty(h: U256) -> f64 {
    if h.is_zero() {
        return 0.0;
    }

    let quotient = *DIFFICULTY_1_TARGET / h;

    // U256 has no direct f64 conversion; express it as the sum of two
    // halves so values beyond 2^64 (trivially satisfied regtest targets)
    // don't silently truncate.
    let low = quotient.low_u128() as f64;
    let high = (quotient >> 128).low_u128() as f64;
    high * 2f64.powi(128) + low
}

/// Big-endian integer of a digest's reverse-byte-order form, i.e. the value
/// compared against the network target.
pub fn hash_to_target_int(digest: &[u8; 32]) -> U256 {
    U256::from_big_endian(&reverse_bytes(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_sha256_anchor() {
        let digest = double_sha256(&[]);
        assert_eq!(
            hex::encode(digest),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn reverse_bytes_is_involution() {
        let data = b"0123456789abcdef".to_vec();
        assert_eq!(reverse_bytes(&reverse_bytes(&data)), data);
    }

    #[test]
    fn reverse_then_big_endian_equals_little_endian() {
        let digest: [u8; 32] = double_sha256(b"soloctl");
        let reversed = reverse_bytes(&digest);
        let be = U256::from_big_endian(&reversed);
        let le = U256::from_little_endian(&digest);
        assert_eq!(be, le);
    }

    #[test]
    fn decode_compact_target_difficulty_1_anchor() {
        let nbits = hex::decode("1d00ffff").unwrap();
        let target = decode_compact_target(&nbits);
        assert_eq!(target, *DIFFICULTY_1_TARGET);
    }

    #[test]
    fn decode_compact_target_rejects_wrong_length() {
        assert_eq!(decode_compact_target(&[0x1d, 0x00, 0xff]), U256::zero());
        assert_eq!(decode_compact_target(&[]), U256::zero());
    }

    #[test]
    fn decode_compact_target_small_exponent_is_a_right_shift() {
        // e = 3: no shift at all.
        let nbits = [0x03, 0x12, 0x34, 0x56];
        assert_eq!(decode_compact_target(&nbits), U256::from(0x123456u64));

        // e < 3 shifts right rather than overflowing.
        let nbits = [0x02, 0x12, 0x34, 0x56];
        assert_eq!(decode_compact_target(&nbits), U256::from(0x1234u64));
    }

    #[test]
    fn decode_compact_target_mainnet_like_vector() {
        let nbits = hex::decode("17030ecc").unwrap();
        let target = decode_compact_target(&nbits);
        assert!(!target.is_zero());
        assert!(target < *DIFFICULTY_1_TARGET);
    }

    #[test]
    fn difficulty_zero_hash_is_zero() {
        assert_eq!(difficulty(U256::zero()), 0.0);
    }

    #[test]
    fn difficulty_at_target_1_is_1() {
        assert_eq!(difficulty(*DIFFICULTY_1_TARGET), 1.0);
    }

    #[test]
    fn difficulty_halves_as_hash_doubles() {
        let h = *DIFFICULTY_1_TARGET / U256::from(2u64);
        assert_eq!(difficulty(h), 2.0);
    }
}
