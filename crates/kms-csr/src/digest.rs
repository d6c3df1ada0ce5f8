use std::fmt;

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::algorithm::KeyAlgorithm;

/// Digest as sent to the KMS sign operation: exactly one hash field is
/// populated, tagged by hash size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmsDigest {
    Sha256(Vec<u8>),
    Sha384(Vec<u8>),
    Sha512(Vec<u8>),
}

impl KmsDigest {
    pub fn bytes(&self) -> &[u8] {
        match self {
            KmsDigest::Sha256(bytes) | KmsDigest::Sha384(bytes) | KmsDigest::Sha512(bytes) => bytes,
        }
    }

    pub fn kind(&self) -> DigestKind {
        match self {
            KmsDigest::Sha256(_) => DigestKind::SHA256,
            KmsDigest::Sha384(_) => DigestKind::SHA384,
            KmsDigest::Sha512(_) => DigestKind::SHA512,
        }
    }
}

/// A hash function paired with the constructor for its [`KmsDigest`] field.
#[derive(Clone, Copy)]
pub struct DigestKind {
    name: &'static str,
    output_len: usize,
    hash: fn(&[u8]) -> Vec<u8>,
    wrap: fn(Vec<u8>) -> KmsDigest,
}

fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

fn sha384(data: &[u8]) -> Vec<u8> {
    Sha384::digest(data).to_vec()
}

fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

impl DigestKind {
    pub const SHA256: DigestKind = DigestKind {
        name: "SHA-256",
        output_len: 32,
        hash: sha256,
        wrap: KmsDigest::Sha256,
    };

    pub const SHA384: DigestKind = DigestKind {
        name: "SHA-384",
        output_len: 48,
        hash: sha384,
        wrap: KmsDigest::Sha384,
    };

    pub const SHA512: DigestKind = DigestKind {
        name: "SHA-512",
        output_len: 64,
        hash: sha512,
        wrap: KmsDigest::Sha512,
    };

    /// Picks the digest from the hash-size suffix of the algorithm name.
    ///
    /// Anything not ending in `256`/`256K`/`384` falls back to SHA-512,
    /// which is what raw PKCS#1 and other unlisted names rely on.
    pub fn for_algorithm(algorithm: KeyAlgorithm) -> DigestKind {
        let name = algorithm.name();
        if name.ends_with("256") || name.ends_with("256K") {
            DigestKind::SHA256
        } else if name.ends_with("384") {
            DigestKind::SHA384
        } else {
            DigestKind::SHA512
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn output_len(&self) -> usize {
        self.output_len
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        (self.hash)(data)
    }

    pub fn wrap(&self, digest: Vec<u8>) -> KmsDigest {
        (self.wrap)(digest)
    }

    pub fn digest_and_wrap(&self, data: &[u8]) -> KmsDigest {
        self.wrap(self.digest(data))
    }
}

impl PartialEq for DigestKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DigestKind {}

impl fmt::Debug for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestKind")
            .field("name", &self.name)
            .field("output_len", &self.output_len)
            .finish()
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
