//! Payload checksums.
//!
//! Sender and receiver only need to agree on the algorithm. MD5 is the
//! default because it is what existing peers put in `payloadHash`; SHA-256
//! and BLAKE3 are available when both ends are configured for them.

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Digest algorithm used for payload verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, hex encoded. Legacy wire default.
    #[default]
    Md5,
    /// SHA-256, hex encoded.
    Sha256,
    /// BLAKE3, hex encoded.
    Blake3,
}

impl ChecksumAlgorithm {
    /// Name as used in settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    /// Start an incremental digest.
    pub fn hasher(&self) -> ChecksumHasher {
        let inner = match self {
            ChecksumAlgorithm::Md5 => HasherInner::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => HasherInner::Sha256(sha2::Sha256::new()),
            ChecksumAlgorithm::Blake3 => HasherInner::Blake3(Box::new(blake3::Hasher::new())),
        };
        ChecksumHasher { inner }
    }

    /// Digest a complete buffer.
    pub fn digest(&self, bytes: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(bytes);
        hasher.finalize()
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown checksum algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown checksum algorithm '{0}' (expected md5, sha256 or blake3)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Incremental digest over a byte stream, fed one chunk at a time.
pub struct ChecksumHasher {
    inner: HasherInner,
}

enum HasherInner {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl ChecksumHasher {
    /// Feed the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.inner {
            HasherInner::Md5(ctx) => ctx.consume(chunk),
            HasherInner::Sha256(hasher) => hasher.update(chunk),
            HasherInner::Blake3(hasher) => {
                hasher.update(chunk);
            }
        }
    }

    /// Lowercase hex digest of everything fed so far.
    pub fn finalize(self) -> String {
        match self.inner {
            HasherInner::Md5(ctx) => format!("{:x}", ctx.compute()),
            HasherInner::Sha256(hasher) => hex::encode(hasher.finalize()),
            HasherInner::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Debug for ChecksumHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self.inner {
            HasherInner::Md5(_) => ChecksumAlgorithm::Md5,
            HasherInner::Sha256(_) => ChecksumAlgorithm::Sha256,
            HasherInner::Blake3(_) => ChecksumAlgorithm::Blake3,
        };
        f.debug_struct("ChecksumHasher")
            .field("algorithm", &algorithm)
            .finish_non_exhaustive()
    }
}

/// Compare two hex digests. Case is not significant.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_known_vectors() {
        assert_eq!(
            ChecksumAlgorithm::Md5.digest(b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            ChecksumAlgorithm::Md5.digest(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            ChecksumAlgorithm::Sha256.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_known_vector() {
        assert_eq!(
            ChecksumAlgorithm::Blake3.digest(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn incremental_digest_ignores_chunk_boundaries() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for algorithm in [
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Blake3,
        ] {
            let whole = algorithm.digest(&data);
            for chunk_size in [1, 7, 512, 4096, 10_000] {
                let mut hasher = algorithm.hasher();
                for chunk in data.chunks(chunk_size) {
                    hasher.update(chunk);
                }
                assert_eq!(hasher.finalize(), whole, "{} / {}", algorithm, chunk_size);
            }
        }
    }

    #[test]
    fn default_is_md5() {
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Md5);
    }

    #[test]
    fn parses_names() {
        assert_eq!("MD5".parse(), Ok(ChecksumAlgorithm::Md5));
        assert_eq!("sha-256".parse(), Ok(ChecksumAlgorithm::Sha256));
        assert_eq!("blake3".parse(), Ok(ChecksumAlgorithm::Blake3));
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(json, "\"sha256\"");
    }

    #[test]
    fn digest_comparison_is_case_insensitive() {
        assert!(digests_match("ABCDEF", "abcdef"));
        assert!(!digests_match("abcdef", "abcdee"));
    }
}
