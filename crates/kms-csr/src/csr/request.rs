use std::io::Write;

use der::asn1::BitString;
use der::pem::LineEnding;
use der::{Decode, DecodePem, Encode, EncodePem};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::algorithm::SignatureScheme;
use crate::error::{KmsCsrError, Result};
use crate::keys::PublicKey;
use crate::signing::ContentSigner;

/// A signed PKCS#10 certification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    inner: CertReq,
}

/// Builds the CertificationRequestInfo for `subject` and `public_key`,
/// streams its DER encoding through `signer` and assembles the request.
///
/// The signature algorithm is resolved before anything is written, so an
/// unsupported algorithm never reaches the signer's backend.
pub fn sign_request<S: ContentSigner + ?Sized>(
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    signer: &mut S,
) -> Result<CertificateRequest> {
    let algorithm = signer.algorithm_identifier()?;
    let info = CertReqInfo {
        version: Version::V1,
        subject,
        public_key,
        attributes: Default::default(),
    };

    let tbs = info.to_der().map_err(encoding)?;
    signer.write_all(&tbs)?;
    let signature = signer.signature()?;

    Ok(CertificateRequest {
        inner: CertReq {
            info,
            algorithm,
            signature: BitString::from_bytes(&signature).map_err(encoding)?,
        },
    })
}

impl CertificateRequest {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der).map_err(encoding)?;
        Ok(Self { inner })
    }

    /// Parses a `CERTIFICATE REQUEST` PEM block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = CertReq::from_pem(pem.trim()).map_err(encoding)?;
        Ok(Self { inner })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner.to_der().map_err(encoding)
    }

    pub fn to_pem(&self) -> Result<String> {
        self.inner.to_pem(LineEnding::LF).map_err(encoding)
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.info.public_key
    }

    pub fn signature_algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.inner.algorithm
    }

    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    pub fn as_cert_req(&self) -> &CertReq {
        &self.inner
    }

    /// Checks the signature against the public key embedded in the request.
    pub fn verify(&self) -> Result<()> {
        let public_key = PublicKey::from_spki(self.public_key())?;
        self.verify_with(&public_key)
    }

    /// Checks the signature against `public_key`.
    pub fn verify_with(&self, public_key: &PublicKey) -> Result<()> {
        let scheme = SignatureScheme::from_identifier(&self.inner.algorithm)?;
        let tbs = self.inner.info.to_der().map_err(encoding)?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            KmsCsrError::Verification("signature BIT STRING has unused bits".to_string())
        })?;
        public_key.verify(scheme, &tbs, signature)
    }
}

impl From<CertReq> for CertificateRequest {
    fn from(inner: CertReq) -> Self {
        Self { inner }
    }
}

impl From<CertificateRequest> for CertReq {
    fn from(request: CertificateRequest) -> Self {
        request.inner
    }
}

fn encoding(error: der::Error) -> KmsCsrError {
    KmsCsrError::Encoding(error.to_string())
}
