//! Header builder (C2): assembles the 80-byte block header from a job and
//! an extranonce pair.
use {
    crate::{hash, job::Job},
    snafu::Snafu,
};

#[derive(Debug, Snafu)]
pub enum HeaderError {
    #[snafu(display("invalid hex in job field {field}: {source}"))]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[snafu(display("job field {field} must be exactly {expected} bytes, found {actual}"))]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

type Result<T, E = HeaderError> = std::result::Result<T, E>;

/// The first 76 bytes of an 80-byte block header: version, previous hash,
/// Merkle root and ntime/nbits, with the trailing 4-byte nonce slot left
/// for the caller to fill in per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPrefix(pub [u8; 76]);

impl HeaderPrefix {
    /// Writes `nonce` (little-endian) into a fresh 80-byte header.
    pub fn with_nonce(&self, nonce: u32) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[..76].copy_from_slice(&self.0);
        header[76..80].copy_from_slice(&nonce.to_le_bytes());
        header
    }
}

fn decode_field(field: &'static str, hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str).map_err(|source| HeaderError::Hex { field, source })
}

fn fixed_field<const N: usize>(field: &'static str, hex_str: &str) -> Result<[u8; N]> {
    let bytes = decode_field(field, hex_str)?;
    bytes.try_into().map_err(|bytes: Vec<u8>| HeaderError::Length {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

/// Folds the coinbase hash with each Merkle branch hash via repeated
/// double-SHA-256, per §4.2 steps 1-4.
pub fn merkle_root(
    coinbase_prefix: &str,
    extranonce1: &[u8],
    extranonce2: &[u8],
    coinbase_suffix: &str,
    merkle_branch: &[String],
) -> Result<[u8; 32]> {
    let mut coinbase = decode_field("coinbase_prefix", coinbase_prefix)?;
    coinbase.extend_from_slice(extranonce1);
    coinbase.extend_from_slice(extranonce2);
    coinbase.extend_from_slice(&decode_field("coinbase_suffix", coinbase_suffix)?);

    let mut root = hash::double_sha256(&coinbase);

    for branch in merkle_branch {
        let branch_bytes: [u8; 32] = fixed_field("merkle_branch", branch)?;
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&root);
        buf.extend_from_slice(&branch_bytes);
        root = hash::double_sha256(&buf);
    }

    Ok(root)
}

/// Builds the 76-byte header prefix for job `J` under extranonce pair
/// `(extranonce1, extranonce2)`, per §4.2.
pub fn build_header(job: &Job, extranonce1: &[u8], extranonce2: &[u8]) -> Result<HeaderPrefix> {
    let root = merkle_root(
        &job.coinbase_prefix,
        extranonce1,
        extranonce2,
        &job.coinbase_suffix,
        &job.merkle_branch,
    )?;
    let merkle_le = hash::reverse_bytes(&root);

    let mut prefix = [0u8; 76];
    prefix[0..4].copy_from_slice(&fixed_field::<4>("version", &job.version)?);
    prefix[4..36].copy_from_slice(&fixed_field::<32>("prev_hash", &job.prev_hash)?);
    prefix[36..68].copy_from_slice(&merkle_le);
    prefix[68..72].copy_from_slice(&fixed_field::<4>("ntime", &job.ntime)?);
    prefix[72..76].copy_from_slice(&fixed_field::<4>("nbits", &job.nbits)?);

    Ok(HeaderPrefix(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job {
            id: "bf".into(),
            prev_hash: "00".repeat(32),
            coinbase_prefix: "01020304".into(),
            coinbase_suffix: "05060708".into(),
            merkle_branch: Vec::new(),
            version: "00000002".into(),
            nbits: "1d00ffff".into(),
            ntime: "504e86b9".into(),
            clean_jobs: false,
        }
    }

    #[test]
    fn header_is_80_bytes_with_zeroed_nonce_slot() {
        let job = sample_job();
        let prefix = build_header(&job, &[0xaa, 0xbb], &[0x01, 0x02]).unwrap();
        let header = prefix.with_nonce(0);
        assert_eq!(header.len(), 80);
        assert_eq!(&header[76..80], &[0, 0, 0, 0]);
    }

    #[test]
    fn nonce_is_written_little_endian() {
        let job = sample_job();
        let prefix = build_header(&job, &[], &[]).unwrap();
        let header = prefix.with_nonce(0x01020304);
        assert_eq!(&header[76..80], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn empty_merkle_branch_root_is_reversed_coinbase_hash() {
        let job = sample_job();
        let coinbase = hex::decode("0102030405060708").unwrap();
        let expected = hash::reverse_bytes(&hash::double_sha256(&coinbase));

        let prefix = build_header(&job, &[], &[]).unwrap();
        let header = prefix.with_nonce(0);
        assert_eq!(&header[36..68], expected.as_slice());
    }

    #[test]
    fn version_and_prevhash_pass_through_verbatim() {
        let job = sample_job();
        let prefix = build_header(&job, &[], &[]).unwrap();
        assert_eq!(&prefix.0[0..4], &[0x00, 0x00, 0x00, 0x02]);
        assert_eq!(&prefix.0[4..36], &[0u8; 32]);
    }

    #[test]
    fn rejects_malformed_hex() {
        let mut job = sample_job();
        job.version = "zz".into();
        assert!(build_header(&job, &[], &[]).is_err());
    }

    #[test]
    fn rejects_wrong_length_prev_hash() {
        let mut job = sample_job();
        job.prev_hash = "00".into();
        assert!(build_header(&job, &[], &[]).is_err());
    }

    #[test]
    fn folds_merkle_branches() {
        let mut job = sample_job();
        let branch = hex::encode([0x42u8; 32]);
        job.merkle_branch = vec![branch.clone()];

        let coinbase = hex::decode("0102030405060708").unwrap();
        let mut expected_root = hash::double_sha256(&coinbase);
        let mut buf = expected_root.to_vec();
        buf.extend_from_slice(&[0x42u8; 32]);
        expected_root = hash::double_sha256(&buf);

        let prefix = build_header(&job, &[], &[]).unwrap();
        let header = prefix.with_nonce(0);
        assert_eq!(&header[36..68], hash::reverse_bytes(&expected_root).as_slice());
    }
}
