use std::fmt;
use std::str::FromStr;

use const_oid::db::rfc5912;
use der::asn1::Any;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use spki::AlgorithmIdentifierOwned;

use crate::error::{KmsCsrError, Result};

/// Algorithm of a KMS crypto key version.
///
/// Fixed by the KMS when the key version is created. Serialized using the
/// KMS wire name, e.g. `EC_SIGN_P256_SHA256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum KeyAlgorithm {
    GoogleSymmetricEncryption,
    RsaSignPss2048Sha256,
    RsaSignPss3072Sha256,
    RsaSignPss4096Sha256,
    RsaSignPss4096Sha512,
    RsaSignPkcs1_2048Sha256,
    RsaSignPkcs1_3072Sha256,
    RsaSignPkcs1_4096Sha256,
    RsaSignPkcs1_4096Sha512,
    RsaSignRawPkcs1_2048,
    RsaSignRawPkcs1_3072,
    RsaSignRawPkcs1_4096,
    RsaDecryptOaep2048Sha256,
    RsaDecryptOaep3072Sha256,
    RsaDecryptOaep4096Sha256,
    RsaDecryptOaep4096Sha512,
    EcSignP256Sha256,
    EcSignP384Sha384,
    EcSignSecp256k1Sha256,
    HmacSha256,
}

/// Key material family, derived from the algorithm name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Ec,
    Rsa,
    Other,
}

impl KeyAlgorithm {
    pub const ALL: [KeyAlgorithm; 20] = [
        KeyAlgorithm::GoogleSymmetricEncryption,
        KeyAlgorithm::RsaSignPss2048Sha256,
        KeyAlgorithm::RsaSignPss3072Sha256,
        KeyAlgorithm::RsaSignPss4096Sha256,
        KeyAlgorithm::RsaSignPss4096Sha512,
        KeyAlgorithm::RsaSignPkcs1_2048Sha256,
        KeyAlgorithm::RsaSignPkcs1_3072Sha256,
        KeyAlgorithm::RsaSignPkcs1_4096Sha256,
        KeyAlgorithm::RsaSignPkcs1_4096Sha512,
        KeyAlgorithm::RsaSignRawPkcs1_2048,
        KeyAlgorithm::RsaSignRawPkcs1_3072,
        KeyAlgorithm::RsaSignRawPkcs1_4096,
        KeyAlgorithm::RsaDecryptOaep2048Sha256,
        KeyAlgorithm::RsaDecryptOaep3072Sha256,
        KeyAlgorithm::RsaDecryptOaep4096Sha256,
        KeyAlgorithm::RsaDecryptOaep4096Sha512,
        KeyAlgorithm::EcSignP256Sha256,
        KeyAlgorithm::EcSignP384Sha384,
        KeyAlgorithm::EcSignSecp256k1Sha256,
        KeyAlgorithm::HmacSha256,
    ];

    /// KMS wire name.
    pub fn name(self) -> &'static str {
        match self {
            KeyAlgorithm::GoogleSymmetricEncryption => "GOOGLE_SYMMETRIC_ENCRYPTION",
            KeyAlgorithm::RsaSignPss2048Sha256 => "RSA_SIGN_PSS_2048_SHA256",
            KeyAlgorithm::RsaSignPss3072Sha256 => "RSA_SIGN_PSS_3072_SHA256",
            KeyAlgorithm::RsaSignPss4096Sha256 => "RSA_SIGN_PSS_4096_SHA256",
            KeyAlgorithm::RsaSignPss4096Sha512 => "RSA_SIGN_PSS_4096_SHA512",
            KeyAlgorithm::RsaSignPkcs1_2048Sha256 => "RSA_SIGN_PKCS1_2048_SHA256",
            KeyAlgorithm::RsaSignPkcs1_3072Sha256 => "RSA_SIGN_PKCS1_3072_SHA256",
            KeyAlgorithm::RsaSignPkcs1_4096Sha256 => "RSA_SIGN_PKCS1_4096_SHA256",
            KeyAlgorithm::RsaSignPkcs1_4096Sha512 => "RSA_SIGN_PKCS1_4096_SHA512",
            KeyAlgorithm::RsaSignRawPkcs1_2048 => "RSA_SIGN_RAW_PKCS1_2048",
            KeyAlgorithm::RsaSignRawPkcs1_3072 => "RSA_SIGN_RAW_PKCS1_3072",
            KeyAlgorithm::RsaSignRawPkcs1_4096 => "RSA_SIGN_RAW_PKCS1_4096",
            KeyAlgorithm::RsaDecryptOaep2048Sha256 => "RSA_DECRYPT_OAEP_2048_SHA256",
            KeyAlgorithm::RsaDecryptOaep3072Sha256 => "RSA_DECRYPT_OAEP_3072_SHA256",
            KeyAlgorithm::RsaDecryptOaep4096Sha256 => "RSA_DECRYPT_OAEP_4096_SHA256",
            KeyAlgorithm::RsaDecryptOaep4096Sha512 => "RSA_DECRYPT_OAEP_4096_SHA512",
            KeyAlgorithm::EcSignP256Sha256 => "EC_SIGN_P256_SHA256",
            KeyAlgorithm::EcSignP384Sha384 => "EC_SIGN_P384_SHA384",
            KeyAlgorithm::EcSignSecp256k1Sha256 => "EC_SIGN_SECP256K1_SHA256",
            KeyAlgorithm::HmacSha256 => "HMAC_SHA256",
        }
    }

    pub fn family(self) -> KeyFamily {
        let name = self.name();
        if name.starts_with("EC") {
            KeyFamily::Ec
        } else if name.starts_with("RSA") {
            KeyFamily::Rsa
        } else {
            KeyFamily::Other
        }
    }

    /// Signature scheme a CSR signed with this key uses.
    ///
    /// Fails for every algorithm outside the supported signing set; there is
    /// no default scheme.
    pub fn signature_scheme(self) -> Result<SignatureScheme> {
        match self {
            KeyAlgorithm::EcSignP256Sha256 => Ok(SignatureScheme::EcdsaSha256),
            KeyAlgorithm::EcSignP384Sha384 => Ok(SignatureScheme::EcdsaSha384),
            KeyAlgorithm::RsaSignPkcs1_2048Sha256
            | KeyAlgorithm::RsaSignPkcs1_3072Sha256
            | KeyAlgorithm::RsaSignPkcs1_4096Sha256 => Ok(SignatureScheme::RsaPkcs1Sha256),
            KeyAlgorithm::RsaSignPkcs1_4096Sha512 => Ok(SignatureScheme::RsaPkcs1Sha512),
            KeyAlgorithm::RsaSignPss2048Sha256
            | KeyAlgorithm::RsaSignPss3072Sha256
            | KeyAlgorithm::RsaSignPss4096Sha256 => Ok(SignatureScheme::RsaPssSha256),
            KeyAlgorithm::RsaSignPss4096Sha512 => Ok(SignatureScheme::RsaPssSha512),
            other => Err(KmsCsrError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KmsCsrError;

    fn from_str(s: &str) -> Result<Self> {
        KeyAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == s)
            .ok_or_else(|| KmsCsrError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl From<KeyAlgorithm> for String {
    fn from(algorithm: KeyAlgorithm) -> Self {
        algorithm.name().to_string()
    }
}

impl TryFrom<String> for KeyAlgorithm {
    type Error = KmsCsrError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// X.509 signature scheme of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaSha256,
    EcdsaSha384,
    RsaPkcs1Sha256,
    RsaPkcs1Sha512,
    RsaPssSha256,
    RsaPssSha512,
}

impl SignatureScheme {
    pub const ALL: [SignatureScheme; 6] = [
        SignatureScheme::EcdsaSha256,
        SignatureScheme::EcdsaSha384,
        SignatureScheme::RsaPkcs1Sha256,
        SignatureScheme::RsaPkcs1Sha512,
        SignatureScheme::RsaPssSha256,
        SignatureScheme::RsaPssSha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignatureScheme::EcdsaSha256 => "SHA256withECDSA",
            SignatureScheme::EcdsaSha384 => "SHA384withECDSA",
            SignatureScheme::RsaPkcs1Sha256 => "SHA256withRSA",
            SignatureScheme::RsaPkcs1Sha512 => "SHA512withRSA",
            SignatureScheme::RsaPssSha256 => "SHA256withRSAandMGF1",
            SignatureScheme::RsaPssSha512 => "SHA512withRSAandMGF1",
        }
    }

    /// ECDSA identifiers carry no parameters, PKCS#1 v1.5 identifiers an
    /// explicit NULL, and RSASSA-PSS identifiers the hash, MGF1 and a salt
    /// as long as the hash output.
    pub fn algorithm_identifier(self) -> Result<AlgorithmIdentifierOwned> {
        let identifier = match self {
            SignatureScheme::EcdsaSha256 => AlgorithmIdentifierOwned {
                oid: rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            SignatureScheme::EcdsaSha384 => AlgorithmIdentifierOwned {
                oid: rfc5912::ECDSA_WITH_SHA_384,
                parameters: None,
            },
            SignatureScheme::RsaPkcs1Sha256 => AlgorithmIdentifierOwned {
                oid: rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            SignatureScheme::RsaPkcs1Sha512 => AlgorithmIdentifierOwned {
                oid: rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            SignatureScheme::RsaPssSha256 => rsa::pss::get_default_pss_signature_algo_id::<Sha256>()
                .map_err(|e| KmsCsrError::Encoding(format!("RSASSA-PSS parameters: {e}")))?,
            SignatureScheme::RsaPssSha512 => rsa::pss::get_default_pss_signature_algo_id::<Sha512>()
                .map_err(|e| KmsCsrError::Encoding(format!("RSASSA-PSS parameters: {e}")))?,
        };
        Ok(identifier)
    }

    /// Reverse lookup used when verifying a finished request.
    pub fn from_identifier(identifier: &AlgorithmIdentifierOwned) -> Result<Self> {
        for scheme in SignatureScheme::ALL {
            if scheme.algorithm_identifier()? == *identifier {
                return Ok(scheme);
            }
        }
        Err(KmsCsrError::UnsupportedAlgorithm(identifier.oid.to_string()))
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signature algorithm identifier for CSRs signed with `algorithm`.
pub fn signature_algorithm_identifier(algorithm: KeyAlgorithm) -> Result<AlgorithmIdentifierOwned> {
    algorithm.signature_scheme()?.algorithm_identifier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use const_oid::db::rfc5912::ID_RSASSA_PSS;

    #[test]
    fn supported_algorithms_map_to_documented_identifiers() {
        let table = [
            (KeyAlgorithm::EcSignP256Sha256, rfc5912::ECDSA_WITH_SHA_256),
            (KeyAlgorithm::EcSignP384Sha384, rfc5912::ECDSA_WITH_SHA_384),
            (KeyAlgorithm::RsaSignPkcs1_2048Sha256, rfc5912::SHA_256_WITH_RSA_ENCRYPTION),
            (KeyAlgorithm::RsaSignPkcs1_3072Sha256, rfc5912::SHA_256_WITH_RSA_ENCRYPTION),
            (KeyAlgorithm::RsaSignPkcs1_4096Sha256, rfc5912::SHA_256_WITH_RSA_ENCRYPTION),
            (KeyAlgorithm::RsaSignPkcs1_4096Sha512, rfc5912::SHA_512_WITH_RSA_ENCRYPTION),
            (KeyAlgorithm::RsaSignPss2048Sha256, ID_RSASSA_PSS),
            (KeyAlgorithm::RsaSignPss3072Sha256, ID_RSASSA_PSS),
            (KeyAlgorithm::RsaSignPss4096Sha256, ID_RSASSA_PSS),
            (KeyAlgorithm::RsaSignPss4096Sha512, ID_RSASSA_PSS),
        ];
        for (algorithm, oid) in table {
            let identifier = signature_algorithm_identifier(algorithm).unwrap();
            assert_eq!(identifier.oid, oid, "{algorithm}");
        }
    }

    #[test]
    fn pss_identifiers_differ_by_hash() {
        let sha256 = signature_algorithm_identifier(KeyAlgorithm::RsaSignPss2048Sha256).unwrap();
        let sha512 = signature_algorithm_identifier(KeyAlgorithm::RsaSignPss4096Sha512).unwrap();
        assert!(sha256.parameters.is_some());
        assert_ne!(sha256, sha512);
    }

    #[test]
    fn ecdsa_identifiers_have_no_parameters() {
        let identifier = signature_algorithm_identifier(KeyAlgorithm::EcSignP256Sha256).unwrap();
        assert!(identifier.parameters.is_none());
    }

    #[test]
    fn unsupported_algorithms_fail_with_their_name() {
        let unsupported = [
            KeyAlgorithm::GoogleSymmetricEncryption,
            KeyAlgorithm::RsaSignRawPkcs1_2048,
            KeyAlgorithm::RsaDecryptOaep2048Sha256,
            KeyAlgorithm::EcSignSecp256k1Sha256,
            KeyAlgorithm::HmacSha256,
        ];
        for algorithm in unsupported {
            let error = signature_algorithm_identifier(algorithm).unwrap_err();
            assert_eq!(
                error,
                KmsCsrError::UnsupportedAlgorithm(algorithm.name().to_string())
            );
        }
    }

    #[test]
    fn scheme_round_trips_through_identifier() {
        for scheme in SignatureScheme::ALL {
            let identifier = scheme.algorithm_identifier().unwrap();
            assert_eq!(SignatureScheme::from_identifier(&identifier).unwrap(), scheme);
        }
    }

    #[test]
    fn name_parses_back() {
        for algorithm in KeyAlgorithm::ALL {
            assert_eq!(algorithm.name().parse::<KeyAlgorithm>().unwrap(), algorithm);
        }
        assert!("EC_SIGN_P521_SHA512".parse::<KeyAlgorithm>().is_err());
    }

    #[test]
    fn family_follows_name_prefix() {
        assert_eq!(KeyAlgorithm::EcSignSecp256k1Sha256.family(), KeyFamily::Ec);
        assert_eq!(KeyAlgorithm::RsaDecryptOaep4096Sha512.family(), KeyFamily::Rsa);
        assert_eq!(KeyAlgorithm::HmacSha256.family(), KeyFamily::Other);
    }

    #[test]
    fn serde_uses_wire_name() {
        let json = serde_json::to_string(&KeyAlgorithm::RsaSignPkcs1_4096Sha512).unwrap();
        assert_eq!(json, "\"RSA_SIGN_PKCS1_4096_SHA512\"");
        let parsed: KeyAlgorithm = serde_json::from_str("\"EC_SIGN_P384_SHA384\"").unwrap();
        assert_eq!(parsed, KeyAlgorithm::EcSignP384Sha384);
    }
}
