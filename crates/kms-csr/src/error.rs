use std::io;

use crate::kms::KmsError;

pub type Result<T> = std::result::Result<T, KmsCsrError>;

/// Errors surfaced while resolving keys and building certificate requests.
///
/// The type is `Clone` so a single failed key load can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KmsCsrError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid crypto key version name: {0}")]
    InvalidKeyName(String),
    #[error("invalid subject distinguished name: {0}")]
    InvalidSubject(String),
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("cannot construct public key for algorithm: {0}")]
    UnsupportedKeyType(String),
    #[error(transparent)]
    Kms(#[from] KmsError),
    #[error("failed to create public key: {0}")]
    PublicKey(String),
    #[error("failed to encode certificate request: {0}")]
    Encoding(String),
    #[error("signature verification failed: {0}")]
    Verification(String),
    #[error("content signer has already produced a signature")]
    SignerAlreadyUsed,
}

/// Writes into a content signer go through `std::io::Write`; unwrap our own
/// error when the signer rejected the write.
impl From<io::Error> for KmsCsrError {
    fn from(error: io::Error) -> Self {
        match error
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<KmsCsrError>())
        {
            Some(inner) => inner.clone(),
            None => KmsCsrError::Encoding(error.to_string()),
        }
    }
}
