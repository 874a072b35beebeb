use std::collections::BTreeMap;

use crate::config::Config;
use crate::hash::ObjectId;

// ---------------------------------------------------------------------------
// Mode constants
// ---------------------------------------------------------------------------

pub const MODE_BLOB: u32 = 0o100644;
pub const MODE_BLOB_EXEC: u32 = 0o100755;
pub const MODE_LINK: u32 = 0o120000;
pub const MODE_TREE: u32 = 0o040000;

/// File-type bits of a mode (`S_IFMT`).
pub const MODE_TYPE_MASK: u32 = 0o170000;

// ---------------------------------------------------------------------------
// FileType
// ---------------------------------------------------------------------------

/// The type of a tree or index entry, derived from the type bits of its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Blob,
    Executable,
    Link,
    Tree,
}

impl FileType {
    /// Classify a raw mode. Permission bits other than the owner-execute
    /// bit are ignored, so both `0o100644` and `0o100664` are blobs.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & MODE_TYPE_MASK {
            0o100000 if mode & 0o100 != 0 => Some(Self::Executable),
            0o100000 => Some(Self::Blob),
            0o120000 => Some(Self::Link),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    /// Convert to a canonical mode.
    pub fn to_mode(self) -> u32 {
        match self {
            Self::Blob => MODE_BLOB,
            Self::Executable => MODE_BLOB_EXEC,
            Self::Link => MODE_LINK,
            Self::Tree => MODE_TREE,
        }
    }

    /// Whether this type represents a regular file (blob or executable).
    pub fn is_file(self) -> bool {
        matches!(self, Self::Blob | Self::Executable)
    }

    /// Whether this type represents a directory.
    pub fn is_dir(self) -> bool {
        matches!(self, Self::Tree)
    }

    /// Whether this type represents a symlink.
    pub fn is_link(self) -> bool {
        matches!(self, Self::Link)
    }
}

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// What a ref file holds: a literal object id or a redirect to another ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(ObjectId),
    /// Full ref name relative to the metadata directory, e.g. `refs/heads/main`.
    Symbolic(String),
}

/// A node of the tree returned by [`crate::refs::list_refs`]: either a
/// resolved ref or a namespace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefNode {
    Ref(ObjectId),
    Dir(BTreeMap<String, RefNode>),
}

impl RefNode {
    /// Flatten into `(full_name, id)` pairs sorted by name, with names
    /// joined by `/` under `prefix`.
    pub fn flatten(&self, prefix: &str) -> Vec<(String, ObjectId)> {
        let mut out = Vec::new();
        flatten_into(self, prefix, &mut out);
        out
    }
}

fn flatten_into(node: &RefNode, prefix: &str, out: &mut Vec<(String, ObjectId)>) {
    match node {
        RefNode::Ref(id) => out.push((prefix.to_string(), *id)),
        RefNode::Dir(children) => {
            for (name, child) in children {
                let full = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                flatten_into(child, &full, out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Classification of worktree paths against the index.
///
/// Paths are relative to the worktree root, `/`-separated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Status {
    pub new: std::collections::BTreeSet<String>,
    pub changed: std::collections::BTreeSet<String>,
    pub deleted: std::collections::BTreeSet<String>,
}

impl Status {
    /// `true` when nothing differs from the index.
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Total number of classified paths.
    pub fn total(&self) -> usize {
        self.new.len() + self.changed.len() + self.deleted.len()
    }
}

// ---------------------------------------------------------------------------
// InitOptions
// ---------------------------------------------------------------------------

/// Options for creating a repository.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Branch `HEAD` initially redirects to.
    pub initial_branch: String,
    /// Config written to the new repository.
    pub config: Config,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            initial_branch: "master".into(),
            config: Config::default(),
        }
    }
}
