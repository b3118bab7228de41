//! Cache keys
//!
//! A `Key` identifies one stored record. It is derived from the request's
//! partition, the resource type, a variant discriminator (the raw `Range`
//! header) and the URL without its fragment, hashed together with the
//! storage salt.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::resource::ResourceRequest;

/// Per-storage salt mixed into every key hash.
pub type Salt = [u8; 8];

/// Identifier of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    partition: String,
    resource_type: String,
    variant: String,
    identifier: String,
    hash: String,
}

impl Key {
    pub fn new(
        partition: impl Into<String>,
        resource_type: impl Into<String>,
        variant: impl Into<String>,
        identifier: impl Into<String>,
        salt: &Salt,
    ) -> Self {
        let partition = partition.into();
        let resource_type = resource_type.into();
        let variant = variant.into();
        let identifier = identifier.into();
        let hash = compute_hash(&partition, &resource_type, &variant, &identifier, salt);
        Self {
            partition,
            resource_type,
            variant,
            identifier,
            hash,
        }
    }

    /// Key for `request`. Range requests only share a slot when their
    /// `Range` strings are byte-identical.
    pub fn from_request(request: &ResourceRequest, resource_type: &str, salt: &Salt) -> Self {
        Self::new(
            request.cache_partition.clone(),
            resource_type,
            request.range().unwrap_or_default(),
            request.url_without_fragment(),
            salt,
        )
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// URL the key was built from, without fragment
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Hex SHA-256 of the components and salt, used as the record file name.
    pub fn hash_string(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.partition, self.resource_type, self.variant, self.identifier
        )
    }
}

fn compute_hash(
    partition: &str,
    resource_type: &str,
    variant: &str,
    identifier: &str,
    salt: &Salt,
) -> String {
    let mut hasher = Sha256::new();
    for component in [partition, resource_type, variant, identifier] {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update((component.len() as u64).to_le_bytes());
        hasher.update(component.as_bytes());
    }
    hasher.update(salt);
    hex::encode(hasher.finalize())
}
