use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KmsCsrError, Result};

const COLLECTIONS: [&str; 5] = [
    "projects",
    "locations",
    "keyRings",
    "cryptoKeys",
    "cryptoKeyVersions",
];

/// Resource name of a crypto key version:
/// `projects/{project}/locations/{location}/keyRings/{key_ring}/cryptoKeys/{crypto_key}/cryptoKeyVersions/{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct KeyVersionName {
    project: String,
    location: String,
    key_ring: String,
    crypto_key: String,
    version: String,
}

impl KeyVersionName {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        key_ring: impl Into<String>,
        crypto_key: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let name = Self {
            project: project.into(),
            location: location.into(),
            key_ring: key_ring.into(),
            crypto_key: crypto_key.into(),
            version: version.into(),
        };
        for segment in name.segments() {
            if segment.is_empty() || segment.contains('/') {
                return Err(KmsCsrError::InvalidKeyName(format!(
                    "invalid segment {segment:?} in {name}"
                )));
            }
        }
        Ok(name)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn key_ring(&self) -> &str {
        &self.key_ring
    }

    pub fn crypto_key(&self) -> &str {
        &self.crypto_key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn segments(&self) -> [&str; 5] {
        [
            self.project.as_str(),
            self.location.as_str(),
            self.key_ring.as_str(),
            self.crypto_key.as_str(),
            self.version.as_str(),
        ]
    }
}

impl fmt::Display for KeyVersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (collection, id)) in COLLECTIONS.iter().zip(self.segments()).enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{collection}/{id}")?;
        }
        Ok(())
    }
}

impl FromStr for KeyVersionName {
    type Err = KmsCsrError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != COLLECTIONS.len() * 2 {
            return Err(KmsCsrError::InvalidKeyName(s.to_string()));
        }
        let mut ids = Vec::with_capacity(COLLECTIONS.len());
        for (pair, collection) in parts.chunks(2).zip(COLLECTIONS) {
            if pair[0] != collection || pair[1].is_empty() {
                return Err(KmsCsrError::InvalidKeyName(s.to_string()));
            }
            ids.push(pair[1]);
        }
        Self::new(ids[0], ids[1], ids[2], ids[3], ids[4])
    }
}

impl From<KeyVersionName> for String {
    fn from(name: KeyVersionName) -> Self {
        name.to_string()
    }
}

impl TryFrom<String> for KeyVersionName {
    type Error = KmsCsrError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
