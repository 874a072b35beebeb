use std::collections::{BTreeMap, HashMap};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::hash::{self, ObjectId, ID_LEN};
use crate::index::IndexEntry;
use crate::object::{Blob, Object, ObjectKind};
use crate::odb::ObjectStore;
use crate::repo::METADATA_DIR;
use crate::types::{FileType, MODE_TREE};

/// Deepest directory nesting [`build_tree`] will descend into.
pub const MAX_TREE_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// Tree object
// ---------------------------------------------------------------------------

/// One `(mode, name, id)` row of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    /// A single path segment.
    pub name: Vec<u8>,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: u32, name: impl Into<Vec<u8>>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    pub fn is_tree(&self) -> bool {
        self.file_type() == Some(FileType::Tree)
    }
}

/// A directory snapshot. Entries are always kept sorted by name bytes, so
/// the encoding and the id depend only on the set of entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_slice().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// `mode-in-decimal SP name NUL 20-byte-id` per entry, in name order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.to_string().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let space = data[pos..]
                .iter()
                .position(|&b| b == b' ')
                .map(|i| pos + i)
                .ok_or_else(|| Error::corrupt("tree entry has no mode separator"))?;
            let mode = std::str::from_utf8(&data[pos..space])
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| Error::corrupt("tree entry mode is not a decimal integer"))?;

            let nul = data[space + 1..]
                .iter()
                .position(|&b| b == 0)
                .map(|i| space + 1 + i)
                .ok_or_else(|| Error::corrupt("tree entry name is not NUL-terminated"))?;
            let name = data[space + 1..nul].to_vec();
            if name.is_empty() || name.contains(&b'/') {
                return Err(Error::corrupt(format!(
                    "tree entry name {:?} is not a single path segment",
                    String::from_utf8_lossy(&name)
                )));
            }

            let id_end = nul + 1 + ID_LEN;
            if id_end > data.len() {
                return Err(Error::corrupt("tree entry truncated inside its object id"));
            }
            let id = ObjectId::from_slice(&data[nul + 1..id_end])?;

            entries.push(TreeEntry { mode, name, id });
            pos = id_end;
        }
        Ok(Self::new(entries))
    }

    /// The id this tree would be stored under.
    pub fn id(&self) -> ObjectId {
        hash::hash_object(ObjectKind::Tree, &self.serialize())
    }
}

// ---------------------------------------------------------------------------
// Directory -> tree
// ---------------------------------------------------------------------------

/// Raw OS mode bits of a filesystem entry.
///
/// On non-Unix platforms the canonical mode of the entry's type is used.
pub fn mode_from_metadata(meta: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.mode()
    }
    #[cfg(not(unix))]
    {
        use crate::types::{MODE_BLOB, MODE_LINK};
        let ft = meta.file_type();
        if ft.is_symlink() {
            MODE_LINK
        } else if ft.is_dir() {
            MODE_TREE
        } else {
            MODE_BLOB
        }
    }
}

/// Build the tree for `dir`.
///
/// Every subdirectory is turned into a tree and stored immediately, since
/// its id is needed by the parent entry. Files become blobs that are only
/// written to the store when `persist_blobs` is set. The returned root tree
/// itself is not stored.
///
/// Symlinks are not followed: a link is recorded as a blob holding its
/// target path. Directories named like the metadata directory are skipped.
///
/// # Errors
/// * [`Error::InvalidArgument`] if `dir` is not a directory under
///   `repo_root`, or nesting exceeds [`MAX_TREE_DEPTH`].
pub fn build_tree(
    store: &ObjectStore,
    dir: &Path,
    repo_root: &Path,
    persist_blobs: bool,
) -> Result<Tree> {
    if !dir.starts_with(repo_root) {
        return Err(Error::invalid_argument(format!(
            "{} is outside the worktree {}",
            dir.display(),
            repo_root.display()
        )));
    }
    let meta = std::fs::symlink_metadata(dir).map_err(|e| Error::io(dir, e))?;
    if !meta.is_dir() {
        return Err(Error::invalid_argument(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    // Pre-order listing; walked backwards, every directory comes after all
    // of its descendants, so its children's ids are ready when we reach it.
    let listing: Vec<walkdir::DirEntry> = WalkDir::new(dir)
        .follow_links(false)
        .max_depth(MAX_TREE_DEPTH + 1)
        .into_iter()
        .filter_entry(|e| !is_metadata_dir(e))
        .collect::<std::result::Result<_, _>>()?;

    let mut pending: HashMap<PathBuf, Vec<TreeEntry>> = HashMap::new();

    for entry in listing.into_iter().rev() {
        if entry.depth() > MAX_TREE_DEPTH {
            return Err(Error::invalid_argument(format!(
                "directory nesting deeper than {} at {}",
                MAX_TREE_DEPTH,
                entry.path().display()
            )));
        }
        let path = entry.path();
        let children = pending.remove(path).unwrap_or_default();

        if entry.depth() == 0 {
            return Ok(Tree::new(children));
        }

        let meta = entry
            .metadata()
            .map_err(|e| Error::io(path, e.into()))?;
        let mode = mode_from_metadata(&meta);
        let ft = entry.file_type();

        let id = if ft.is_dir() {
            let subtree = Tree::new(children);
            store.store(&Object::Tree(subtree))?
        } else {
            let data = if ft.is_symlink() {
                link_target_bytes(path)?
            } else {
                std::fs::read(path).map_err(|e| Error::io(path, e))?
            };
            if persist_blobs {
                store.store(&Object::Blob(Blob::new(data)))?
            } else {
                hash::hash_object(ObjectKind::Blob, &data)
            }
        };
        log::trace!("tree entry {} {} {}", mode, id, path.display());

        let parent = path
            .parent()
            .ok_or_else(|| Error::invalid_argument(format!("{} has no parent", path.display())))?;
        pending
            .entry(parent.to_path_buf())
            .or_default()
            .push(TreeEntry::new(mode, os_name_bytes(entry.file_name()), id));
    }

    // The walk always yields `dir` itself at depth 0.
    Err(Error::not_found(dir.display().to_string()))
}

fn is_metadata_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == METADATA_DIR
}

/// Target of a symlink as raw bytes.
pub(crate) fn link_target_bytes(path: &Path) -> Result<Vec<u8>> {
    let target = std::fs::read_link(path).map_err(|e| Error::io(path, e))?;
    Ok(os_name_bytes(target.as_os_str()))
}

#[cfg(unix)]
fn os_name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

// ---------------------------------------------------------------------------
// Index -> tree
// ---------------------------------------------------------------------------

enum Node {
    Leaf { mode: u32, id: ObjectId },
    Dir { mode: u32, children: BTreeMap<Vec<u8>, Node> },
}

/// Store nested trees for the staged entries and return the root tree id.
///
/// File entries become leaves. Directory entries only contribute their mode
/// to the matching subtree; their stored ids are ignored since the tree is
/// rebuilt from the files below it.
///
/// # Errors
/// [`Error::Corrupt`] if a path is staged both as a file and as a directory.
pub fn write_tree_from_index(store: &ObjectStore, entries: &[IndexEntry]) -> Result<ObjectId> {
    let mut root = BTreeMap::new();

    for entry in entries {
        if entry.path.is_empty() {
            continue;
        }
        let segments: Vec<&str> = entry.path.split('/').collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => continue,
        };

        let mut level = &mut root;
        for seg in parents {
            let node = level.entry(seg.as_bytes().to_vec()).or_insert_with(|| Node::Dir {
                mode: MODE_TREE,
                children: BTreeMap::new(),
            });
            level = match node {
                Node::Dir { children, .. } => children,
                Node::Leaf { .. } => {
                    return Err(Error::corrupt(format!(
                        "index stages {} below a file",
                        entry.path
                    )))
                }
            };
        }

        let is_dir = entry.file_type() == Some(FileType::Tree);
        match level.entry(last.as_bytes().to_vec()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(if is_dir {
                    Node::Dir {
                        mode: entry.mode,
                        children: BTreeMap::new(),
                    }
                } else {
                    Node::Leaf {
                        mode: entry.mode,
                        id: entry.id,
                    }
                });
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => match (slot.get_mut(), is_dir) {
                (Node::Dir { mode, .. }, true) => *mode = entry.mode,
                _ => {
                    return Err(Error::corrupt(format!(
                        "index stages {} both as a file and a directory",
                        entry.path
                    )))
                }
            },
        }
    }

    let tree = store_level(store, root)?;
    store.store(&Object::Tree(tree))
}

fn store_level(store: &ObjectStore, level: BTreeMap<Vec<u8>, Node>) -> Result<Tree> {
    let mut entries = Vec::with_capacity(level.len());
    for (name, node) in level {
        match node {
            Node::Leaf { mode, id } => entries.push(TreeEntry { mode, name, id }),
            Node::Dir { mode, children } => {
                let subtree = store_level(store, children)?;
                let id = store.store(&Object::Tree(subtree))?;
                entries.push(TreeEntry { mode, name, id });
            }
        }
    }
    Ok(Tree::new(entries))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read the tree stored under `id`.
///
/// # Errors
/// [`Error::InvalidArgument`] if the object is not a tree.
pub fn read_tree(store: &ObjectStore, id: ObjectId) -> Result<Tree> {
    match store.read(id)? {
        Object::Tree(tree) => Ok(tree),
        other => Err(Error::invalid_argument(format!(
            "{} is a {}, not a tree",
            id,
            other.kind()
        ))),
    }
}

/// Recursively walk a tree, returning all non-tree entries with full paths.
///
/// Each element is a `(full_path, TreeEntry)` pair where `full_path` is the
/// slash-separated path from the tree root. Results are sorted by path.
pub fn walk_tree(store: &ObjectStore, id: ObjectId) -> Result<Vec<(String, TreeEntry)>> {
    let mut results = Vec::new();
    let mut stack = vec![(String::new(), id)];

    while let Some((prefix, tree_id)) = stack.pop() {
        let tree = read_tree(store, tree_id)?;
        let mut subtrees = Vec::new();
        for entry in tree.entries() {
            let name = entry.name_lossy();
            let full_path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            if entry.is_tree() {
                subtrees.push((full_path, entry.id));
            } else {
                results.push((full_path, entry.clone()));
            }
        }
        stack.extend(subtrees.into_iter().rev());
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}
