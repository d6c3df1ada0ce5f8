use const_oid::db::rfc5912;
use der::{DecodePem, Encode};
use p256::ecdsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha512};
use spki::{DecodePublicKey, SubjectPublicKeyInfoOwned};

use crate::algorithm::{KeyAlgorithm, KeyFamily, SignatureScheme};
use crate::error::{KmsCsrError, Result};

/// Public half of a KMS key, parsed into a typed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    Secp256k1(k256::PublicKey),
    Rsa(RsaPublicKey),
}

/// Decodes a `PUBLIC KEY` PEM block into its SubjectPublicKeyInfo.
pub fn decode_spki_pem(pem: &str) -> Result<SubjectPublicKeyInfoOwned> {
    SubjectPublicKeyInfoOwned::from_pem(pem.trim())
        .map_err(|e| KmsCsrError::PublicKey(format!("malformed public key PEM: {e}")))
}

impl PublicKey {
    /// Parses `spki` as the key type implied by the KMS algorithm family.
    pub fn for_algorithm(algorithm: KeyAlgorithm, spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        match algorithm.family() {
            KeyFamily::Ec => Self::ec_from_der(&spki_der(spki)?),
            KeyFamily::Rsa => Self::rsa_from_der(&spki_der(spki)?),
            KeyFamily::Other => Err(KmsCsrError::UnsupportedKeyType(algorithm.to_string())),
        }
    }

    /// Parses `spki` by its own algorithm OID, without KMS metadata.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki_der(spki)?;
        if spki.algorithm.oid == rfc5912::RSA_ENCRYPTION {
            Self::rsa_from_der(&der)
        } else if spki.algorithm.oid == rfc5912::ID_EC_PUBLIC_KEY {
            Self::ec_from_der(&der)
        } else {
            Err(KmsCsrError::UnsupportedKeyType(spki.algorithm.oid.to_string()))
        }
    }

    fn ec_from_der(der: &[u8]) -> Result<Self> {
        // the named curve in the SPKI parameters decides which of these accepts it
        p256::PublicKey::from_public_key_der(der)
            .map(PublicKey::P256)
            .or_else(|_| p384::PublicKey::from_public_key_der(der).map(PublicKey::P384))
            .or_else(|_| k256::PublicKey::from_public_key_der(der).map(PublicKey::Secp256k1))
            .map_err(|e| KmsCsrError::PublicKey(format!("EC public key: {e}")))
    }

    fn rsa_from_der(der: &[u8]) -> Result<Self> {
        RsaPublicKey::from_public_key_der(der)
            .map(PublicKey::Rsa)
            .map_err(|e| KmsCsrError::PublicKey(format!("RSA public key: {e}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PublicKey::P256(_) => "EC P-256",
            PublicKey::P384(_) => "EC P-384",
            PublicKey::Secp256k1(_) => "EC secp256k1",
            PublicKey::Rsa(_) => "RSA",
        }
    }

    /// Verifies `signature` over `message` under `scheme`.
    pub fn verify(&self, scheme: SignatureScheme, message: &[u8], signature: &[u8]) -> Result<()> {
        match (scheme, self) {
            (SignatureScheme::EcdsaSha256, PublicKey::P256(key)) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(verification)?;
                p256::ecdsa::VerifyingKey::from(key)
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (SignatureScheme::EcdsaSha384, PublicKey::P384(key)) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(verification)?;
                p384::ecdsa::VerifyingKey::from(key)
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (SignatureScheme::RsaPkcs1Sha256, PublicKey::Rsa(key)) => {
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(verification)?;
                rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (SignatureScheme::RsaPkcs1Sha512, PublicKey::Rsa(key)) => {
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(verification)?;
                rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key.clone())
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (SignatureScheme::RsaPssSha256, PublicKey::Rsa(key)) => {
                let signature = rsa::pss::Signature::try_from(signature).map_err(verification)?;
                rsa::pss::VerifyingKey::<Sha256>::new(key.clone())
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (SignatureScheme::RsaPssSha512, PublicKey::Rsa(key)) => {
                let signature = rsa::pss::Signature::try_from(signature).map_err(verification)?;
                rsa::pss::VerifyingKey::<Sha512>::new(key.clone())
                    .verify(message, &signature)
                    .map_err(verification)
            }
            (scheme, key) => Err(KmsCsrError::Verification(format!(
                "{} key cannot verify {scheme} signatures",
                key.kind()
            ))),
        }
    }
}

fn spki_der(spki: &SubjectPublicKeyInfoOwned) -> Result<Vec<u8>> {
    spki.to_der()
        .map_err(|e| KmsCsrError::PublicKey(format!("re-encoding SubjectPublicKeyInfo: {e}")))
}

fn verification(error: impl std::fmt::Display) -> KmsCsrError {
    KmsCsrError::Verification(error.to_string())
}
