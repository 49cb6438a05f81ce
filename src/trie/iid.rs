//! Entity ids
//!
//! An `Iid` is the fixed-width, hashed form of an entity's primary key. The
//! trie is keyed on it directly: sorting by iid is sorting by hash path.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::{ChronoError, ChronoResult};

/// Width of an iid in bytes
pub const IID_LEN: usize = 16;

/// 16-byte entity id. Ordered as unsigned bytes, most significant first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Iid([u8; IID_LEN]);

impl Iid {
    pub const fn from_bytes(bytes: [u8; IID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ChronoResult<Self> {
        let arr: [u8; IID_LEN] = bytes.try_into().map_err(|_| {
            ChronoError::malformed(format!("iid must be {} bytes, got {}", IID_LEN, bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// UUID keys keep their own bytes.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }

    /// Derives the iid of a string key.
    ///
    /// A key that parses as a UUID maps to that UUID's bytes; anything else
    /// maps to the leading 16 bytes of its SHA-256 digest.
    pub fn for_key(key: &str) -> Self {
        match Uuid::parse_str(key) {
            Ok(uuid) => Self::from_uuid(uuid),
            Err(_) => Self::hashed(key.as_bytes()),
        }
    }

    /// Derives the iid of a JSON key: strings as `for_key`, anything else from
    /// its compact JSON text.
    pub fn for_value(key: &Value) -> Self {
        match key {
            Value::String(s) => Self::for_key(s),
            other => Self::hashed(other.to_string().as_bytes()),
        }
    }

    fn hashed(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; IID_LEN];
        out.copy_from_slice(&digest[..IID_LEN]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; IID_LEN] {
        &self.0
    }

    /// Parses the 32-hex-digit form produced by `Display`
    pub fn parse_hex(s: &str) -> ChronoResult<Self> {
        Uuid::try_parse(s)
            .map(Self::from_uuid)
            .map_err(|e| ChronoError::malformed(format!("invalid iid '{}': {}", s, e)))
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).simple())
    }
}

impl fmt::Debug for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iid({})", self)
    }
}

impl Serialize for Iid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Iid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Iid::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}
