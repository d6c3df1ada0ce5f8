use std::str::FromStr;
use std::time::Duration;

use tracing::info;
use x509_cert::name::Name;

use super::request::{CertificateRequest, sign_request};
use crate::cache::{DEFAULT_KEY_CACHE_TTL, KeyCache};
use crate::config::KmsCsrConfig;
use crate::error::{KmsCsrError, Result};
use crate::kms::{KeyVersionName, KmsClient};
use crate::signing::KmsContentSigner;

/// Long-lived entry point: owns the KMS client and the key cache shared by
/// every CSR it builds. Cheap to share across threads behind an `Arc`.
pub struct CsrBuilderFactory<C> {
    key_cache: KeyCache<C>,
}

/// Configures a [`CsrBuilderFactory`].
pub struct FactoryBuilder<C> {
    client: C,
    key_cache_ttl: Duration,
}

impl<C: KmsClient> FactoryBuilder<C> {
    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    pub fn with_config(mut self, config: &KmsCsrConfig) -> Self {
        self.key_cache_ttl = config.key_cache_ttl();
        self
    }

    pub fn build(self) -> CsrBuilderFactory<C> {
        CsrBuilderFactory {
            key_cache: KeyCache::new(self.client, self.key_cache_ttl),
        }
    }
}

impl<C: KmsClient> CsrBuilderFactory<C> {
    /// Factory with the default one hour key cache.
    pub fn new(client: C) -> Self {
        Self::builder(client).build()
    }

    pub fn builder(client: C) -> FactoryBuilder<C> {
        FactoryBuilder {
            client,
            key_cache_ttl: DEFAULT_KEY_CACHE_TTL,
        }
    }

    pub fn csr_builder(&self) -> CsrBuilder<'_, C> {
        CsrBuilder {
            factory: self,
            key_name: None,
            principal: None,
        }
    }

    pub fn key_cache(&self) -> &KeyCache<C> {
        &self.key_cache
    }
}

/// Builds a single certification request signed by a KMS key.
pub struct CsrBuilder<'a, C> {
    factory: &'a CsrBuilderFactory<C>,
    key_name: Option<KeyVersionName>,
    principal: Option<Name>,
}

impl<C: KmsClient> CsrBuilder<'_, C> {
    pub fn with_key(mut self, key_name: KeyVersionName) -> Self {
        self.key_name = Some(key_name);
        self
    }

    pub fn for_principal(mut self, principal: Name) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Sets the principal from an RFC 4514 string such as `CN=host,O=Acme`.
    pub fn for_subject(self, subject: &str) -> Result<Self> {
        let principal = Name::from_str(subject)
            .map_err(|e| KmsCsrError::InvalidSubject(format!("{subject:?}: {e}")))?;
        Ok(self.for_principal(principal))
    }

    /// Resolves the key, signs through the KMS and returns the request.
    ///
    /// Both the key name and the principal must be set; nothing is sent to
    /// the KMS otherwise.
    pub fn build(self) -> Result<CertificateRequest> {
        let key_name = self
            .key_name
            .ok_or(KmsCsrError::MissingField("crypto key version name"))?;
        let principal = self
            .principal
            .ok_or(KmsCsrError::MissingField("X500 principal"))?;

        let key_cache = &self.factory.key_cache;
        let entry = key_cache.get(&key_name)?;
        let mut signer = KmsContentSigner::new(key_cache.client(), key_name, entry.algorithm());
        let request = sign_request(principal, entry.spki().clone(), &mut signer)?;

        info!(
            key = %entry.name(),
            algorithm = %entry.algorithm(),
            subject = %request.subject(),
            "built certification request"
        );
        Ok(request)
    }
}
