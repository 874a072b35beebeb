//! Worktree status against the staging index.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::hash::{self, ObjectId};
use crate::index::IndexEntry;
use crate::object::ObjectKind;
use crate::odb::ObjectStore;
use crate::paths::worktree_relative;
use crate::repo::METADATA_DIR;
use crate::tree::{build_tree, link_target_bytes};
use crate::types::Status;

/// A live worktree path and whether it is a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreePath {
    pub path: String,
    pub abs: PathBuf,
    pub is_dir: bool,
}

/// Every file, symlink and directory below `root`, keyed by normalized
/// worktree-relative path. The metadata directory is skipped.
pub fn enumerate_worktree(root: &Path) -> Result<BTreeMap<String, WorktreePath>> {
    let mut out = BTreeMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == METADATA_DIR));
    for entry in walker {
        let entry = entry?;
        let path = worktree_relative(root, entry.path())?;
        out.insert(
            path.clone(),
            WorktreePath {
                path,
                abs: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
            },
        );
    }
    Ok(out)
}

/// Hash of what is on disk at `live` now: a blob hash for files and links,
/// a tree hash (with subtrees persisted) for directories.
pub fn live_hash(store: &ObjectStore, root: &Path, live: &WorktreePath) -> Result<ObjectId> {
    if live.is_dir {
        return Ok(build_tree(store, &live.abs, root, false)?.id());
    }
    let meta = std::fs::symlink_metadata(&live.abs).map_err(|e| Error::io(&live.abs, e))?;
    let data = if meta.file_type().is_symlink() {
        link_target_bytes(&live.abs)?
    } else {
        std::fs::read(&live.abs).map_err(|e| Error::io(&live.abs, e))?
    };
    Ok(hash::hash_object(ObjectKind::Blob, &data))
}

/// Classify worktree paths against `index`.
///
/// * `new`: on disk, not in the index. Directories count on their own, so
///   an unstaged directory is new even when paths below it are staged.
/// * `deleted`: in the index, gone from disk.
/// * `changed`: in both, with a live hash that differs from the staged one.
pub fn compute_status(store: &ObjectStore, root: &Path, index: &[IndexEntry]) -> Result<Status> {
    let worktree = enumerate_worktree(root)?;
    let staged: BTreeMap<&str, &IndexEntry> =
        index.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut status = Status::default();

    for (path, live) in &worktree {
        match staged.get(path.as_str()) {
            Some(entry) => {
                let id = live_hash(store, root, live)?;
                if id != entry.id {
                    log::trace!("changed {}: staged {} live {}", path, entry.id, id);
                    status.changed.insert(path.clone());
                }
            }
            None => {
                status.new.insert(path.clone());
            }
        }
    }

    status.deleted = staged
        .keys()
        .filter(|p| !worktree.contains_key(**p))
        .map(|p| p.to_string())
        .collect::<BTreeSet<_>>();

    log::debug!(
        "status: {} new, {} changed, {} deleted",
        status.new.len(),
        status.changed.len(),
        status.deleted.len()
    );
    Ok(status)
}
