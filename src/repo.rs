use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::commit::{Commit, Signature, Tag};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::{self, ObjectId};
use crate::index::{self, IndexEntry};
use crate::object::{Object, ObjectKind};
use crate::odb::ObjectStore;
use crate::paths::{atomic_write, validate_ref_name, worktree_relative};
use crate::refdict::RefDict;
use crate::refs::{self, HEAD, HEADS_PREFIX, TAGS_PREFIX};
use crate::tree::{self, link_target_bytes, Tree, TreeEntry};
use crate::types::{FileType, InitOptions, RefNode, RefTarget, Status};

/// Name of the metadata directory inside a worktree.
pub const METADATA_DIR: &str = ".sprig";

const DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";

/// A worktree with its `.sprig` metadata directory.
///
/// All operations go straight to the filesystem; nothing is cached except
/// the config read at open time. Mutating calls (staging, commits, ref
/// updates) must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct Repository {
    worktree: PathBuf,
    meta_dir: PathBuf,
    objects: ObjectStore,
    config: Config,
}

impl Repository {
    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a repository in `path`, which must be missing or an empty
    /// directory.
    ///
    /// # Errors
    /// * [`Error::AlreadyExists`] if `path` exists and is not a directory.
    /// * [`Error::NotEmpty`] if `path` is a directory with entries.
    /// * [`Error::InvalidArgument`] if the initial branch name is invalid.
    pub fn init(path: impl AsRef<Path>, options: InitOptions) -> Result<Self> {
        let path = path.as_ref();
        prepare_empty_dir(path)?;

        let head_target = format!("{}{}", HEADS_PREFIX, options.initial_branch);
        validate_ref_name(&head_target)?;

        let worktree = std::fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
        let meta_dir = worktree.join(METADATA_DIR);
        for dir in ["objects", "refs/heads", "refs/tags"] {
            let dir = meta_dir.join(dir);
            std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        atomic_write(&meta_dir.join("description"), DESCRIPTION.as_bytes())?;
        refs::write_ref(&meta_dir, HEAD, &RefTarget::Symbolic(head_target))?;
        options.config.save(&meta_dir.join("config"))?;

        log::debug!("initialized repository in {}", meta_dir.display());
        Ok(Self {
            objects: ObjectStore::new(meta_dir.join("objects")),
            worktree,
            meta_dir,
            config: options.config,
        })
    }

    /// Open the repository whose worktree is `worktree`.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if there is no metadata directory or no config
    ///   file.
    /// * [`Error::InvalidArgument`] for an unsupported
    ///   `core.repositoryformatversion`.
    pub fn open(worktree: impl AsRef<Path>) -> Result<Self> {
        let path = worktree.as_ref();
        let worktree = std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path.display().to_string()),
            _ => Error::io(path, e),
        })?;
        let meta_dir = worktree.join(METADATA_DIR);
        if !meta_dir.is_dir() {
            return Err(Error::not_found(format!(
                "not a repository (no {} in {})",
                METADATA_DIR,
                worktree.display()
            )));
        }

        let config = Config::load(&meta_dir.join("config"))?;
        config.check_format_version()?;

        Ok(Self {
            objects: ObjectStore::new(meta_dir.join("objects")),
            worktree,
            meta_dir,
            config,
        })
    }

    /// Find the repository containing `start` by walking up its ancestors.
    ///
    /// Returns `Ok(None)` when no ancestor has a metadata directory.
    pub fn discover(start: impl AsRef<Path>) -> Result<Option<Self>> {
        let start = start.as_ref();
        let start = std::fs::canonicalize(start).map_err(|e| Error::io(start, e))?;
        for dir in start.ancestors() {
            if dir.join(METADATA_DIR).is_dir() {
                log::debug!("discovered repository at {}", dir.display());
                return Self::open(dir).map(Some);
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    /// The `.sprig` directory.
    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_path(&self) -> PathBuf {
        self.meta_dir.join("index")
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.worktree.join(path)
        }
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    pub fn store_object(&self, obj: &Object) -> Result<ObjectId> {
        self.objects.store(obj)
    }

    pub fn read_object(&self, id: ObjectId) -> Result<Object> {
        self.objects.read(id)
    }

    /// Hash the contents of `path` as an object of `kind`, storing it when
    /// `write` is set.
    ///
    /// Non-blob contents must parse as that kind.
    ///
    /// # Errors
    /// [`Error::Corrupt`] if the file is not a valid object of `kind`.
    pub fn hash_file(&self, path: impl AsRef<Path>, kind: ObjectKind, write: bool) -> Result<ObjectId> {
        let path = self.absolute(path.as_ref());
        let data = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        if kind != ObjectKind::Blob {
            Object::deserialize(kind, &data)?;
        }
        if write {
            self.objects.store_raw(kind, &data)
        } else {
            Ok(hash::hash_object(kind, &data))
        }
    }

    /// Resolve a revision. See [`crate::resolve::resolve`].
    pub fn resolve(
        &self,
        spec: &str,
        expected: Option<ObjectKind>,
        follow: bool,
    ) -> Result<Option<ObjectId>> {
        crate::resolve::resolve(self, spec, expected, follow)
    }

    /// Resolve a revision, following tags, to an object of `kind` (or of any
    /// kind when `kind` is `None`).
    pub fn rev_parse(&self, spec: &str, kind: Option<ObjectKind>) -> Result<ObjectId> {
        self.resolve(spec, kind, true)?
            .ok_or_else(|| Error::not_found(format!("revision {}", spec)))
    }

    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Every ref under `refs/`, resolved.
    pub fn list_refs(&self) -> Result<RefNode> {
        refs::list_refs(&self.meta_dir, "refs")
    }

    /// Create or replace a ref. Names other than `HEAD` that do not start
    /// with `refs/` are taken relative to `refs/` (`tags/v1`).
    pub fn create_ref(&self, name: &str, target: RefTarget) -> Result<()> {
        let full = if name == HEAD || name.starts_with("refs/") {
            name.to_string()
        } else {
            format!("refs/{}", name)
        };
        refs::write_ref(&self.meta_dir, &full, &target)
    }

    /// What `HEAD` holds, without following it.
    pub fn head(&self) -> Result<RefTarget> {
        refs::read_ref(&self.meta_dir, HEAD)
    }

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_id(&self) -> Result<Option<ObjectId>> {
        Ok(refs::resolve_chain(&self.meta_dir, HEAD)?.1)
    }

    /// A [`RefDict`] over `refs/heads/`.
    pub fn branches(&self) -> RefDict<'_> {
        RefDict::new(self, HEADS_PREFIX)
    }

    /// A [`RefDict`] over `refs/tags/`.
    pub fn tags(&self) -> RefDict<'_> {
        RefDict::new(self, TAGS_PREFIX)
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    /// # Errors
    /// [`Error::NotFound`] if nothing has been staged yet.
    pub fn read_index(&self) -> Result<Vec<IndexEntry>> {
        index::read_index(&self.index_path())
    }

    pub fn write_index(&self, entries: &[IndexEntry]) -> Result<()> {
        index::write_index(&self.index_path(), entries)
    }

    /// The index, or no entries when no index file exists yet.
    pub fn load_index(&self) -> Result<Vec<IndexEntry>> {
        match self.read_index() {
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Stage `paths` (absolute, or relative to the worktree).
    ///
    /// Files are stored as blobs and recorded with their live metadata.
    /// Directories stage everything below them, plus one entry per
    /// directory holding its tree id. Paths that disappeared from disk are
    /// dropped from the index. Staged directories above a processed path
    /// get their tree id re-derived from what is staged below them. Returns
    /// the normalized paths processed.
    ///
    /// # Errors
    /// [`Error::NotFound`] for a path that is neither on disk nor staged.
    pub fn stage<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<String>> {
        let mut entries: BTreeMap<String, IndexEntry> = self
            .load_index()?
            .into_iter()
            .map(|e| (e.path.clone(), e))
            .collect();
        let mut staged = Vec::with_capacity(paths.len());

        for path in paths {
            let abs = self.absolute(path.as_ref());
            let rel = worktree_relative(&self.worktree, &abs)?;
            if rel.split('/').next() == Some(METADATA_DIR) {
                return Err(Error::invalid_argument(format!(
                    "cannot stage {} inside the metadata directory",
                    rel
                )));
            }

            match std::fs::symlink_metadata(&abs) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if remove_below(&mut entries, &rel, true) == 0 {
                        return Err(Error::not_found(format!(
                            "{} is neither in the worktree nor staged",
                            rel
                        )));
                    }
                    log::debug!("unstaged vanished path {}", rel);
                }
                Err(e) => return Err(Error::io(&abs, e)),
                Ok(meta) if meta.is_dir() => {
                    remove_below(&mut entries, &rel, true);
                    drop_file_ancestors(&mut entries, &rel);
                    self.stage_dir(&mut entries, &abs)?;
                }
                Ok(meta) => {
                    remove_below(&mut entries, &rel, false);
                    drop_file_ancestors(&mut entries, &rel);
                    let id = self.store_blob(&abs, &meta)?;
                    log::debug!("staged {} {}", id, rel);
                    entries.insert(rel.clone(), IndexEntry::from_metadata(rel.clone(), id, &meta));
                }
            }
            staged.push(rel);
        }
        self.refresh_dir_entries(&mut entries, &staged)?;

        let entries: Vec<IndexEntry> = entries.into_values().collect();
        self.write_index(&entries)?;
        Ok(staged)
    }

    fn stage_dir(&self, entries: &mut BTreeMap<String, IndexEntry>, dir: &Path) -> Result<()> {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == METADATA_DIR));
        for dent in walker {
            let dent = dent?;
            let rel = worktree_relative(&self.worktree, dent.path())?;
            if rel.is_empty() {
                continue;
            }
            let meta = dent.metadata()?;
            let id = if dent.file_type().is_dir() {
                let tree = tree::build_tree(&self.objects, dent.path(), &self.worktree, true)?;
                self.objects.store(&Object::Tree(tree))?
            } else {
                self.store_blob(dent.path(), &meta)?
            };
            log::debug!("staged {} {}", id, rel);
            entries.insert(rel.clone(), IndexEntry::from_metadata(rel, id, &meta));
        }
        Ok(())
    }

    /// Re-derive the ids of staged directory entries above `touched` from
    /// the entries now staged below them.
    fn refresh_dir_entries(
        &self,
        entries: &mut BTreeMap<String, IndexEntry>,
        touched: &[String],
    ) -> Result<()> {
        let ancestors: BTreeSet<String> = touched
            .iter()
            .flat_map(|p| p.match_indices('/').map(move |(i, _)| p[..i].to_string()))
            .collect();
        for dir in ancestors {
            let is_dir_entry = entries
                .get(&dir)
                .map_or(false, |e| e.file_type() == Some(FileType::Tree));
            if !is_dir_entry {
                continue;
            }
            let prefix = format!("{}/", dir);
            let below: Vec<IndexEntry> = entries
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, e)| {
                    let mut e = e.clone();
                    e.path = k[prefix.len()..].to_string();
                    e
                })
                .collect();
            let id = tree::write_tree_from_index(&self.objects, &below)?;
            if let Some(entry) = entries.get_mut(&dir) {
                log::debug!("restaged directory {} as {}", dir, id);
                entry.id = id;
            }
        }
        Ok(())
    }

    fn store_blob(&self, path: &Path, meta: &Metadata) -> Result<ObjectId> {
        let data = if meta.file_type().is_symlink() {
            link_target_bytes(path)?
        } else {
            std::fs::read(path).map_err(|e| Error::io(path, e))?
        };
        self.objects.store_raw(ObjectKind::Blob, &data)
    }

    // -----------------------------------------------------------------------
    // Trees, status, commits
    // -----------------------------------------------------------------------

    /// Build the tree for `dir` (absolute, or relative to the worktree).
    /// Subtrees are stored; the returned tree is not. Blobs are stored only
    /// when `persist_blobs` is set.
    pub fn build_tree(&self, dir: impl AsRef<Path>, persist_blobs: bool) -> Result<Tree> {
        let dir = self.absolute(dir.as_ref());
        tree::build_tree(&self.objects, &dir, &self.worktree, persist_blobs)
    }

    /// Store the trees for the staged entries and return the root tree id.
    pub fn write_tree(&self) -> Result<ObjectId> {
        tree::write_tree_from_index(&self.objects, &self.load_index()?)
    }

    /// Every non-tree entry below the tree `id` names (following a commit
    /// to its tree), with full paths, sorted.
    pub fn read_tree_recursive(&self, id: ObjectId) -> Result<Vec<(String, TreeEntry)>> {
        let tree_id = self
            .resolve(&id.to_hex(), Some(ObjectKind::Tree), true)?
            .ok_or_else(|| Error::not_found(format!("tree for {}", id)))?;
        tree::walk_tree(&self.objects, tree_id)
    }

    /// Classify worktree paths as new, changed or deleted against the index.
    pub fn compute_status(&self) -> Result<Status> {
        crate::status::compute_status(&self.objects, &self.worktree, &self.load_index()?)
    }

    fn default_signature(&self) -> Result<Signature> {
        self.config.user_signature().ok_or_else(|| {
            Error::invalid_argument("no identity given and user.name is not configured")
        })
    }

    /// Commit the staged tree on the branch `HEAD` redirects to (or on
    /// `HEAD` itself when detached) and return the new commit id.
    ///
    /// The current `HEAD` commit, if any, becomes the parent. A trailing
    /// newline is added to `message` when missing. Without `author`, the
    /// `[user]` identity from the config is used.
    pub fn commit(&self, message: &str, author: Option<Signature>) -> Result<ObjectId> {
        let author = match author {
            Some(author) => author,
            None => self.default_signature()?,
        };
        let tree = self.write_tree()?;
        let (branch, parent) = refs::resolve_chain(&self.meta_dir, HEAD)?;

        let mut message = message.to_string();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        let commit = Commit::new(tree, parent.into_iter().collect(), author, message);
        let id = self.objects.store(&Object::Commit(commit))?;
        refs::write_ref(&self.meta_dir, &branch, &RefTarget::Direct(id))?;

        log::debug!("committed {} on {}", id, branch);
        Ok(id)
    }

    /// Create the tag `name` on the object `target` names.
    ///
    /// With `message` an annotated tag object is stored and the ref points
    /// at it; otherwise the ref points at the target directly. Returns the
    /// id the new ref holds.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the tag exists.
    pub fn create_tag(
        &self,
        name: &str,
        target: &str,
        message: Option<&str>,
        tagger: Option<Signature>,
    ) -> Result<ObjectId> {
        if self.tags().has(name)? {
            return Err(Error::already_exists(format!("tag '{}'", name)));
        }
        let target_id = self.rev_parse(target, None)?;

        let id = match message {
            None => target_id,
            Some(message) => {
                let tagger = match tagger {
                    Some(tagger) => tagger,
                    None => self.default_signature()?,
                };
                let kind = self.objects.read_kind(target_id)?;
                let mut message = message.to_string();
                if !message.ends_with('\n') {
                    message.push('\n');
                }
                let tag = Tag::new(target_id, kind, name, tagger, message);
                self.objects.store(&Object::Tag(tag))?
            }
        };
        self.tags().set(name, id)?;
        log::debug!("tagged {} as {}", id, name);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // History and checkout
    // -----------------------------------------------------------------------

    /// Every commit reachable from the commit `spec` names, depth first with
    /// first parents ahead of later ones. Each commit appears once.
    pub fn log(&self, spec: &str) -> Result<Vec<(ObjectId, Commit)>> {
        let start = self.rev_parse(spec, Some(ObjectKind::Commit))?;
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        let mut history = Vec::new();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let commit = match self.objects.read(id)? {
                Object::Commit(commit) => commit,
                other => {
                    return Err(Error::corrupt(format!(
                        "parent {} is a {}, not a commit",
                        id,
                        other.kind()
                    )))
                }
            };
            stack.extend(commit.parents.iter().rev().copied());
            history.push((id, commit));
        }
        Ok(history)
    }

    /// Write the tree `spec` names (following tags and commits) into `dest`,
    /// which must be missing or an empty directory. Returns the number of
    /// files and links written.
    ///
    /// # Errors
    /// * [`Error::AlreadyExists`] if `dest` exists and is not a directory.
    /// * [`Error::NotEmpty`] if `dest` is a directory with entries.
    pub fn checkout(&self, spec: &str, dest: impl AsRef<Path>) -> Result<usize> {
        let tree_id = self.rev_parse(spec, Some(ObjectKind::Tree))?;
        let tree = tree::read_tree(&self.objects, tree_id)?;
        let dest = self.absolute(dest.as_ref());
        prepare_empty_dir(&dest)?;

        let written = checkout_tree(&self.objects, &tree, &dest, 0)?;
        log::debug!("checked out {} ({} files) into {}", tree_id, written, dest.display());
        Ok(written)
    }
}

/// Remove entries strictly below `path` (and `path` itself when
/// `include_self`), returning how many were removed. An empty `path` is the
/// worktree root.
fn remove_below(entries: &mut BTreeMap<String, IndexEntry>, path: &str, include_self: bool) -> usize {
    let prefix = if path.is_empty() {
        String::new()
    } else {
        format!("{}/", path)
    };
    let doomed: Vec<String> = entries
        .keys()
        .filter(|k| (include_self && k.as_str() == path) || k.starts_with(&prefix))
        .cloned()
        .collect();
    for key in &doomed {
        entries.remove(key);
    }
    doomed.len()
}

/// A path staged as a file cannot also be a parent directory.
fn drop_file_ancestors(entries: &mut BTreeMap<String, IndexEntry>, path: &str) {
    for (i, _) in path.match_indices('/') {
        let ancestor = &path[..i];
        let is_file = entries
            .get(ancestor)
            .map_or(false, |e| e.file_type() != Some(FileType::Tree));
        if is_file {
            entries.remove(ancestor);
        }
    }
}

/// Make sure `path` is an empty directory, creating it when missing.
///
/// # Errors
/// * [`Error::AlreadyExists`] if `path` exists and is not a directory.
/// * [`Error::NotEmpty`] if `path` is a directory with entries.
fn prepare_empty_dir(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => Err(Error::already_exists(format!(
            "{} exists and is not a directory",
            path.display()
        ))),
        Ok(_) => {
            let mut listing = std::fs::read_dir(path).map_err(|e| Error::io(path, e))?;
            if listing.next().is_some() {
                return Err(Error::not_empty(path.display().to_string()));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))
        }
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write the entries of `tree` below `dir`, which already exists.
fn checkout_tree(store: &ObjectStore, tree: &Tree, dir: &Path, depth: usize) -> Result<usize> {
    if depth > tree::MAX_TREE_DEPTH {
        return Err(Error::corrupt(format!(
            "tree nesting deeper than {} at {}",
            tree::MAX_TREE_DEPTH,
            dir.display()
        )));
    }
    let mut written = 0;
    for entry in tree.entries() {
        let name = entry.name_lossy();
        if name == "." || name == ".." || name == METADATA_DIR {
            return Err(Error::corrupt(format!("tree entry name {:?}", name)));
        }
        let dest = dir.join(&name);
        match entry.file_type() {
            Some(FileType::Tree) => {
                std::fs::create_dir(&dest).map_err(|e| Error::io(&dest, e))?;
                let subtree = tree::read_tree(store, entry.id)?;
                written += checkout_tree(store, &subtree, &dest, depth + 1)?;
            }
            Some(ft) => {
                let blob = match store.read(entry.id)? {
                    Object::Blob(blob) => blob,
                    other => {
                        return Err(Error::corrupt(format!(
                            "{} at {} is a {}, not a blob",
                            entry.id,
                            dest.display(),
                            other.kind()
                        )))
                    }
                };
                write_checkout_file(&dest, ft, entry.mode, &blob.data)?;
                written += 1;
            }
            None => {
                return Err(Error::corrupt(format!(
                    "unknown mode {:o} for {}",
                    entry.mode,
                    dest.display()
                )))
            }
        }
    }
    Ok(written)
}

#[cfg(unix)]
fn write_checkout_file(dest: &Path, ft: FileType, mode: u32, data: &[u8]) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;

    if ft == FileType::Link {
        let target = std::ffi::OsStr::from_bytes(data);
        return std::os::unix::fs::symlink(target, dest).map_err(|e| Error::io(dest, e));
    }
    std::fs::write(dest, data).map_err(|e| Error::io(dest, e))?;
    std::fs::set_permissions(dest, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::io(dest, e))
}

#[cfg(not(unix))]
fn write_checkout_file(dest: &Path, _ft: FileType, _mode: u32, data: &[u8]) -> Result<()> {
    std::fs::write(dest, data).map_err(|e| Error::io(dest, e))
}
