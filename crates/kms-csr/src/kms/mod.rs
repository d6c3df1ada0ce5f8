mod name;
pub mod local;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::algorithm::KeyAlgorithm;
pub use crate::digest::KmsDigest;
pub use local::{CallCounts, LocalKms};
pub use name::KeyVersionName;

/// Failure reported by the KMS collaborator. Passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KmsError {
    #[error("crypto key version not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("KMS unavailable: {0}")]
    Unavailable(String),
}

/// Metadata of a crypto key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub name: KeyVersionName,
    pub algorithm: KeyAlgorithm,
}

/// The three KMS operations the CSR builder depends on.
///
/// Implementations are blocking. For async transports, bridge with
/// `block_on` inside the implementation or call the builder from
/// `spawn_blocking`.
pub trait KmsClient: Send + Sync {
    fn get_key_metadata(&self, key_name: &KeyVersionName) -> Result<KeyMetadata, KmsError>;

    /// PEM encoded SubjectPublicKeyInfo (`-----BEGIN PUBLIC KEY-----`).
    fn get_public_key_pem(&self, key_name: &KeyVersionName) -> Result<String, KmsError>;

    /// Signs a prehashed digest. Returns raw signature bytes (DER for ECDSA).
    fn asymmetric_sign(
        &self,
        key_name: &KeyVersionName,
        digest: &KmsDigest,
    ) -> Result<Vec<u8>, KmsError>;
}

impl<T: KmsClient + ?Sized> KmsClient for &T {
    fn get_key_metadata(&self, key_name: &KeyVersionName) -> Result<KeyMetadata, KmsError> {
        (**self).get_key_metadata(key_name)
    }

    fn get_public_key_pem(&self, key_name: &KeyVersionName) -> Result<String, KmsError> {
        (**self).get_public_key_pem(key_name)
    }

    fn asymmetric_sign(
        &self,
        key_name: &KeyVersionName,
        digest: &KmsDigest,
    ) -> Result<Vec<u8>, KmsError> {
        (**self).asymmetric_sign(key_name, digest)
    }
}

impl<T: KmsClient + ?Sized> KmsClient for Arc<T> {
    fn get_key_metadata(&self, key_name: &KeyVersionName) -> Result<KeyMetadata, KmsError> {
        (**self).get_key_metadata(key_name)
    }

    fn get_public_key_pem(&self, key_name: &KeyVersionName) -> Result<String, KmsError> {
        (**self).get_public_key_pem(key_name)
    }

    fn asymmetric_sign(
        &self,
        key_name: &KeyVersionName,
        digest: &KmsDigest,
    ) -> Result<Vec<u8>, KmsError> {
        (**self).asymmetric_sign(key_name, digest)
    }
}
