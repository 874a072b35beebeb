//! The four object kinds and their canonical encoding.
//!
//! Every object is addressed by the SHA-1 of `"<kind> <len>\0<payload>"`.
//! [`Object`] is a closed variant; the store dispatches on the kind tag it
//! reads from the header, never on the Rust type.

use std::fmt;
use std::str::FromStr;

use crate::commit::{Commit, Tag};
use crate::error::{Error, Result};
use crate::hash::{self, ObjectId};
use crate::tree::Tree;

/// Object kind tag as it appears in the canonical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parse a header tag. Unknown tags are corruption, not user error.
    pub fn from_bytes(tag: &[u8]) -> Result<Self> {
        match tag {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            other => Err(Error::corrupt(format!(
                "unknown object kind {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    /// Parse a user-supplied kind name (e.g. from `--type`).
    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
            .map_err(|_| Error::invalid_argument(format!("unknown object kind '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw file content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(Self::new(data))
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Any stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Payload bytes, without the header.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.serialize(),
            Self::Tree(t) => t.serialize(),
            Self::Commit(c) => c.serialize(),
            Self::Tag(t) => t.serialize(),
        }
    }

    /// Decode a payload of the given kind.
    pub fn deserialize(kind: ObjectKind, payload: &[u8]) -> Result<Self> {
        Ok(match kind {
            ObjectKind::Blob => Self::Blob(Blob::deserialize(payload)?),
            ObjectKind::Tree => Self::Tree(Tree::deserialize(payload)?),
            ObjectKind::Commit => Self::Commit(Commit::deserialize(payload)?),
            ObjectKind::Tag => Self::Tag(Tag::deserialize(payload)?),
        })
    }

    /// Header plus payload.
    pub fn encode(&self) -> Vec<u8> {
        hash::encode_object(self.kind(), &self.serialize())
    }

    /// Parse a full canonical encoding (`kind SP len NUL payload`).
    ///
    /// # Errors
    /// [`Error::Corrupt`] for a malformed header, a declared length that
    /// differs from the payload length, or an unknown kind.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let (kind, payload) = split_header(raw)?;
        Self::deserialize(kind, payload)
    }

    /// The content hash of this object.
    pub fn id(&self) -> ObjectId {
        hash::hash_object(self.kind(), &self.serialize())
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}

impl From<Tag> for Object {
    fn from(t: Tag) -> Self {
        Self::Tag(t)
    }
}

/// Split a canonical encoding into its kind and payload, validating the
/// declared length.
pub fn split_header(raw: &[u8]) -> Result<(ObjectKind, &[u8])> {
    let space = raw
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| Error::corrupt("object header has no kind separator"))?;
    let nul = raw[space..]
        .iter()
        .position(|&b| b == 0)
        .map(|i| space + i)
        .ok_or_else(|| Error::corrupt("object header is not NUL-terminated"))?;

    let len_str = std::str::from_utf8(&raw[space + 1..nul])
        .map_err(|_| Error::corrupt("object length is not ASCII"))?;
    let declared: usize = len_str
        .parse()
        .map_err(|_| Error::corrupt(format!("bad object length {:?}", len_str)))?;
    let payload = &raw[nul + 1..];
    if declared != payload.len() {
        return Err(Error::corrupt(format!(
            "bad length: header says {} bytes, payload has {}",
            declared,
            payload.len()
        )));
    }

    let kind = ObjectKind::from_bytes(&raw[..space])?;
    Ok((kind, payload))
}
