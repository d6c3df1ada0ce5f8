use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use der::pem::LineEnding;
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::SignatureEncoding;
use rsa::signature::hazmat::{PrehashSigner, RandomizedPrehashSigner};
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::EncodePublicKey;
use tracing::debug;

use super::{KeyMetadata, KeyVersionName, KmsClient, KmsDigest, KmsError};
use crate::algorithm::{KeyAlgorithm, SignatureScheme};
use crate::digest::DigestKind;

/// In-memory KMS holding software keys.
///
/// Behaves like the remote service as far as the CSR builder can tell:
/// keys are addressed by version name, public keys come back as PEM, ECDSA
/// signatures are DER encoded, and digests of the wrong size are refused.
/// Every call is counted so tests can assert how often the service was hit.
#[derive(Default)]
pub struct LocalKms {
    keys: RwLock<HashMap<KeyVersionName, LocalKey>>,
    counters: Counters,
    latency: Option<Duration>,
}

struct LocalKey {
    algorithm: KeyAlgorithm,
    private_key: PrivateKey,
}

enum PrivateKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
    Rsa(RsaPrivateKey),
}

#[derive(Debug, Default)]
struct Counters {
    get_key_metadata: AtomicUsize,
    get_public_key_pem: AtomicUsize,
    asymmetric_sign: AtomicUsize,
}

/// Snapshot of how many times each KMS operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_key_metadata: usize,
    pub get_public_key_pem: usize,
    pub asymmetric_sign: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.get_key_metadata + self.get_public_key_pem + self.asymmetric_sign
    }
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps this long in every metadata lookup, simulating a round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Creates a key version whose private key is derived from `seed`.
    ///
    /// EC keys use the hash of the seed as the scalar; RSA keys are generated
    /// from a ChaCha20 CSPRNG seeded with the SHA-256 of the seed.
    pub fn generate_key(
        &self,
        name: KeyVersionName,
        algorithm: KeyAlgorithm,
        seed: &str,
    ) -> anyhow::Result<()> {
        let private_key = PrivateKey::from_seed(algorithm, seed)
            .with_context(|| format!("generating {algorithm} key for {name}"))?;
        self.insert(name, algorithm, private_key);
        Ok(())
    }

    /// Imports a PKCS#8 PEM private key as a key version.
    pub fn import_pkcs8_pem(
        &self,
        name: KeyVersionName,
        algorithm: KeyAlgorithm,
        pem: &str,
    ) -> anyhow::Result<()> {
        let private_key = PrivateKey::from_pkcs8_pem(algorithm, pem)
            .with_context(|| format!("importing {algorithm} key for {name}"))?;
        self.insert(name, algorithm, private_key);
        Ok(())
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get_key_metadata: self.counters.get_key_metadata.load(Ordering::SeqCst),
            get_public_key_pem: self.counters.get_public_key_pem.load(Ordering::SeqCst),
            asymmetric_sign: self.counters.asymmetric_sign.load(Ordering::SeqCst),
        }
    }

    fn insert(&self, name: KeyVersionName, algorithm: KeyAlgorithm, private_key: PrivateKey) {
        debug!(key = %name, %algorithm, "local KMS key added");
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, LocalKey { algorithm, private_key });
    }

    fn with_key<T>(
        &self,
        name: &KeyVersionName,
        f: impl FnOnce(&LocalKey) -> Result<T, KmsError>,
    ) -> Result<T, KmsError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let key = keys
            .get(name)
            .ok_or_else(|| KmsError::NotFound(name.to_string()))?;
        f(key)
    }
}

impl KmsClient for LocalKms {
    fn get_key_metadata(&self, key_name: &KeyVersionName) -> Result<KeyMetadata, KmsError> {
        self.counters.get_key_metadata.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        self.with_key(key_name, |key| {
            Ok(KeyMetadata {
                name: key_name.clone(),
                algorithm: key.algorithm,
            })
        })
    }

    fn get_public_key_pem(&self, key_name: &KeyVersionName) -> Result<String, KmsError> {
        self.counters.get_public_key_pem.fetch_add(1, Ordering::SeqCst);
        self.with_key(key_name, |key| {
            key.private_key
                .public_key_pem()
                .map_err(|e| KmsError::Unavailable(format!("{e:#}")))
        })
    }

    fn asymmetric_sign(
        &self,
        key_name: &KeyVersionName,
        digest: &KmsDigest,
    ) -> Result<Vec<u8>, KmsError> {
        self.counters.asymmetric_sign.fetch_add(1, Ordering::SeqCst);
        self.with_key(key_name, |key| {
            let expected = DigestKind::for_algorithm(key.algorithm);
            if digest.kind() != expected {
                return Err(KmsError::InvalidArgument(format!(
                    "{} requires a {expected} digest, got {}",
                    key.algorithm,
                    digest.kind()
                )));
            }
            key.private_key
                .sign_prehash(key.algorithm, digest.bytes())
                .map_err(|e| KmsError::InvalidArgument(format!("{e:#}")))
        })
    }
}

fn rsa_modulus_bits(algorithm: KeyAlgorithm) -> Option<usize> {
    match algorithm {
        KeyAlgorithm::RsaSignPkcs1_2048Sha256 | KeyAlgorithm::RsaSignPss2048Sha256 => Some(2048),
        KeyAlgorithm::RsaSignPkcs1_3072Sha256 | KeyAlgorithm::RsaSignPss3072Sha256 => Some(3072),
        KeyAlgorithm::RsaSignPkcs1_4096Sha256
        | KeyAlgorithm::RsaSignPkcs1_4096Sha512
        | KeyAlgorithm::RsaSignPss4096Sha256
        | KeyAlgorithm::RsaSignPss4096Sha512 => Some(4096),
        _ => None,
    }
}

impl PrivateKey {
    fn from_seed(algorithm: KeyAlgorithm, seed: &str) -> anyhow::Result<Self> {
        match algorithm {
            KeyAlgorithm::EcSignP256Sha256 => {
                let hash = Sha256::digest(seed.as_bytes());
                p256::ecdsa::SigningKey::from_bytes(&hash)
                    .map(PrivateKey::P256)
                    .map_err(|e| anyhow!("invalid seed: {e}"))
            }
            KeyAlgorithm::EcSignP384Sha384 => {
                let hash = Sha384::digest(seed.as_bytes());
                p384::ecdsa::SigningKey::from_bytes(&hash)
                    .map(PrivateKey::P384)
                    .map_err(|e| anyhow!("invalid seed: {e}"))
            }
            KeyAlgorithm::EcSignSecp256k1Sha256 => {
                let hash = Sha256::digest(seed.as_bytes());
                k256::ecdsa::SigningKey::from_bytes(&hash)
                    .map(PrivateKey::Secp256k1)
                    .map_err(|e| anyhow!("invalid seed: {e}"))
            }
            other => {
                let Some(bits) = rsa_modulus_bits(other) else {
                    bail!("local KMS cannot hold {other} keys");
                };
                let hash = Sha256::digest(seed.as_bytes());
                let mut rng = ChaCha20Rng::from_seed(hash.into());
                let key = RsaPrivateKey::new(&mut rng, bits)
                    .context("generating RSA key from seed")?;
                Ok(PrivateKey::Rsa(key))
            }
        }
    }

    fn from_pkcs8_pem(algorithm: KeyAlgorithm, pem: &str) -> anyhow::Result<Self> {
        let key = match algorithm {
            KeyAlgorithm::EcSignP256Sha256 => {
                p256::ecdsa::SigningKey::from_pkcs8_pem(pem).map(PrivateKey::P256)
            }
            KeyAlgorithm::EcSignP384Sha384 => {
                p384::ecdsa::SigningKey::from_pkcs8_pem(pem).map(PrivateKey::P384)
            }
            KeyAlgorithm::EcSignSecp256k1Sha256 => {
                k256::ecdsa::SigningKey::from_pkcs8_pem(pem).map(PrivateKey::Secp256k1)
            }
            other if rsa_modulus_bits(other).is_some() => {
                RsaPrivateKey::from_pkcs8_pem(pem).map(PrivateKey::Rsa)
            }
            other => bail!("local KMS cannot hold {other} keys"),
        };
        key.map_err(|e| anyhow!("invalid PKCS#8 private key: {e}"))
    }

    fn public_key_pem(&self) -> anyhow::Result<String> {
        let pem = match self {
            PrivateKey::P256(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::P384(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::Secp256k1(key) => key.verifying_key().to_public_key_pem(LineEnding::LF),
            PrivateKey::Rsa(key) => key.to_public_key().to_public_key_pem(LineEnding::LF),
        };
        pem.map_err(|e| anyhow!("encoding public key PEM: {e}"))
    }

    fn sign_prehash(&self, algorithm: KeyAlgorithm, digest: &[u8]) -> anyhow::Result<Vec<u8>> {
        let signature = match self {
            PrivateKey::P256(key) => PrehashSigner::<p256::ecdsa::Signature>::sign_prehash(key, digest)
                .map(|signature| signature.to_der().as_bytes().to_vec()),
            PrivateKey::P384(key) => PrehashSigner::<p384::ecdsa::Signature>::sign_prehash(key, digest)
                .map(|signature| signature.to_der().as_bytes().to_vec()),
            PrivateKey::Secp256k1(key) => {
                PrehashSigner::<k256::ecdsa::Signature>::sign_prehash(key, digest)
                    .map(|signature| signature.to_der().as_bytes().to_vec())
            }
            PrivateKey::Rsa(key) => {
                // PSS salt comes from a CSPRNG seeded with the digest
                let mut rng = ChaCha20Rng::from_seed(Sha256::digest(digest).into());
                match algorithm.signature_scheme()? {
                    SignatureScheme::RsaPkcs1Sha256 => {
                        rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone())
                            .sign_prehash(digest)
                            .map(|signature| signature.to_vec())
                    }
                    SignatureScheme::RsaPkcs1Sha512 => {
                        rsa::pkcs1v15::SigningKey::<Sha512>::new(key.clone())
                            .sign_prehash(digest)
                            .map(|signature| signature.to_vec())
                    }
                    SignatureScheme::RsaPssSha256 => rsa::pss::SigningKey::<Sha256>::new(key.clone())
                        .sign_prehash_with_rng(&mut rng, digest)
                        .map(|signature| signature.to_vec()),
                    SignatureScheme::RsaPssSha512 => rsa::pss::SigningKey::<Sha512>::new(key.clone())
                        .sign_prehash_with_rng(&mut rng, digest)
                        .map(|signature| signature.to_vec()),
                    scheme => bail!("{scheme} cannot be produced by an RSA key"),
                }
            }
        };
        signature.map_err(|e| anyhow!("{algorithm} sign_prehash failed: {e}"))
    }
}
