use std::io;

use spki::AlgorithmIdentifierOwned;
use tracing::debug;

use super::signer::ContentSigner;
use crate::algorithm::{KeyAlgorithm, signature_algorithm_identifier};
use crate::digest::DigestKind;
use crate::error::{KmsCsrError, Result};
use crate::kms::{KeyVersionName, KmsClient};

/// Lifecycle of a [`KmsContentSigner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    Empty,
    Accumulating,
    Signed,
}

/// Content signer whose private key lives in the KMS.
///
/// Buffers the written bytes, hashes them with the digest the key's
/// algorithm requires and sends only the digest to `asymmetric_sign`.
/// Single use: once a signature was requested, further writes and signature
/// requests fail, including after a failed remote call.
pub struct KmsContentSigner<'a, C: ?Sized> {
    client: &'a C,
    key_name: KeyVersionName,
    algorithm: KeyAlgorithm,
    buffer: Vec<u8>,
    state: SignerState,
}

impl<'a, C: KmsClient + ?Sized> KmsContentSigner<'a, C> {
    pub fn new(client: &'a C, key_name: KeyVersionName, algorithm: KeyAlgorithm) -> Self {
        Self {
            client,
            key_name,
            algorithm,
            buffer: Vec::new(),
            state: SignerState::Empty,
        }
    }

    pub fn key_name(&self) -> &KeyVersionName {
        &self.key_name
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn state(&self) -> SignerState {
        self.state
    }
}

impl<C: KmsClient + ?Sized> io::Write for KmsContentSigner<'_, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state == SignerState::Signed {
            return Err(io::Error::other(KmsCsrError::SignerAlreadyUsed));
        }
        self.state = SignerState::Accumulating;
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: KmsClient + ?Sized> ContentSigner for KmsContentSigner<'_, C> {
    fn algorithm_identifier(&self) -> Result<AlgorithmIdentifierOwned> {
        signature_algorithm_identifier(self.algorithm)
    }

    fn signature(&mut self) -> Result<Vec<u8>> {
        if self.state == SignerState::Signed {
            return Err(KmsCsrError::SignerAlreadyUsed);
        }
        self.state = SignerState::Signed;

        let data = std::mem::take(&mut self.buffer);
        let kind = DigestKind::for_algorithm(self.algorithm);
        let digest = kind.digest_and_wrap(&data);
        debug!(
            key = %self.key_name,
            algorithm = %self.algorithm,
            digest = %kind,
            len = data.len(),
            "requesting KMS signature"
        );
        Ok(self.client.asymmetric_sign(&self.key_name, &digest)?)
    }
}
