//! SHA-1 object ids and the canonical object hashing function.

use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::object::ObjectKind;

/// Length of a raw object id in bytes.
pub const ID_LEN: usize = 20;

/// Length of a full object id in hex characters.
pub const HEX_LEN: usize = 40;

/// A 20-byte SHA-1 object id.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an id from a 20-byte slice, as found inside trees and the index.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ID_LEN] = bytes.try_into().map_err(|_| {
            Error::corrupt(format!(
                "object id must be {} bytes, got {}",
                ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Lowercase 40-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a full 40-character hex id (either case).
    pub fn from_hex(text: &str) -> Result<Self> {
        if text.len() != HEX_LEN {
            return Err(Error::invalid_argument(format!(
                "object id must be {} hex characters, got {}",
                HEX_LEN,
                text.len()
            )));
        }
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|e| Error::invalid_argument(format!("invalid object id {:?}: {}", text, e)))?;
        Ok(Self(bytes))
    }

    /// The shard directory name (first two hex characters).
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

/// `true` when `s` is made only of ASCII hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// SHA-1 of arbitrary bytes.
pub fn sha1_bytes(data: &[u8]) -> ObjectId {
    let digest = Sha1::digest(data);
    ObjectId(digest.into())
}

/// Canonical encoding of an object: `"<kind> <len>\0<payload>"`.
pub fn encode_object(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind, payload.len());
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// The id of an object with the given kind and payload, without storing it.
pub fn hash_object(kind: ObjectKind, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", kind, payload.len()).as_bytes());
    hasher.update(payload);
    ObjectId(hasher.finalize().into())
}
