pub mod algorithm;
pub mod cache;
pub mod config;
pub mod csr;
pub mod digest;
pub mod error;
pub mod keys;
pub mod kms;
pub mod signing;

pub use algorithm::{KeyAlgorithm, SignatureScheme, signature_algorithm_identifier};
pub use cache::{DEFAULT_KEY_CACHE_TTL, KeyCache, KeyEntry};
pub use config::KmsCsrConfig;
pub use csr::{CertificateRequest, CsrBuilder, CsrBuilderFactory};
pub use digest::{DigestKind, KmsDigest};
pub use error::{KmsCsrError, Result};
pub use keys::PublicKey;
pub use kms::{KeyMetadata, KeyVersionName, KmsClient, KmsError, LocalKms};
pub use signing::{ContentSigner, KmsContentSigner, SignerState};
