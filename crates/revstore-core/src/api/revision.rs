//! Revision strings: `"<version>-<hash>"`.
//!
//! `hash` is 32 lowercase hex characters of the xxh3-128 digest of the
//! record serialized without its revision and primary-key fields. Map keys
//! serialize in sorted order, so equal content always hashes equally.

use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::xxh3_128;

use crate::error::StorageError;
use crate::types::{REVISION_FIELD, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub version: u64,
    pub hash: String,
}

impl Revision {
    pub fn new(version: u64, hash: impl Into<String>) -> Self {
        Self {
            version,
            hash: hash.into(),
        }
    }

    /// The revision `record` would carry at `version`.
    pub fn of(record: &Record, primary_key: &str, version: u64) -> Self {
        Self::new(version, content_hash(record, primary_key))
    }

    /// The revision following this one for `record`, or `None` when the
    /// content hash has not changed.
    pub fn next_for(&self, record: &Record, primary_key: &str) -> Option<Self> {
        let hash = content_hash(record, primary_key);
        (hash != self.hash).then(|| Self::new(self.version + 1, hash))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version, self.hash)
    }
}

impl FromStr for Revision {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidRevision(s.to_string());
        let (version, hash) = s.split_once('-').ok_or_else(invalid)?;
        let version: u64 = version.parse().map_err(|_| invalid())?;
        if hash.len() != 32 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        Ok(Self::new(version, hash.to_ascii_lowercase()))
    }
}

/// Digest of `record` excluding the revision and primary-key fields.
pub fn content_hash(record: &Record, primary_key: &str) -> String {
    let mut content = record.clone();
    content.remove(REVISION_FIELD);
    content.remove(primary_key);
    // Serializing a map of JSON values cannot fail.
    let bytes = serde_json::to_vec(&content).unwrap_or_default();
    format!("{:032x}", xxh3_128(&bytes))
}
