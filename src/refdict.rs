use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::paths::validate_ref_name;
use crate::refs::{self, HEAD, TAGS_PREFIX};
use crate::repo::Repository;
use crate::types::RefTarget;

/// A transient, borrowed view over the refs sharing a common prefix
/// (`refs/heads/` or `refs/tags/`).
///
/// `repo.branches()` and `repo.tags()` both return `RefDict` instances.
/// Names passed to and returned from a `RefDict` are short names such as
/// `main` or `v1.0`.
pub struct RefDict<'a> {
    repo: &'a Repository,
    prefix: &'static str,
}

impl<'a> RefDict<'a> {
    pub(crate) fn new(repo: &'a Repository, prefix: &'static str) -> Self {
        Self { repo, prefix }
    }

    fn full_name(&self, name: &str) -> Result<String> {
        let full = format!("{}{}", self.prefix, name);
        validate_ref_name(&full)?;
        Ok(full)
    }

    fn is_tags(&self) -> bool {
        self.prefix == TAGS_PREFIX
    }

    /// The object the named ref points at, following redirects.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the ref does not exist.
    pub fn get(&self, name: &str) -> Result<ObjectId> {
        refs::deref_ref(self.repo.meta_dir(), &self.full_name(name)?)
    }

    /// Returns `true` if the named branch or tag exists.
    pub fn has(&self, name: &str) -> Result<bool> {
        Ok(refs::try_read_ref(self.repo.meta_dir(), &self.full_name(name)?)?.is_some())
    }

    /// Point the named ref at `id`.
    ///
    /// Branches are created or moved. Tags are immutable: setting a tag
    /// that already exists fails.
    ///
    /// # Errors
    /// * [`Error::InvalidArgument`] if `name` is not a valid ref name.
    /// * [`Error::NotFound`] if `id` is not in the object store.
    /// * [`Error::AlreadyExists`] if setting a tag that already exists.
    pub fn set(&self, name: &str, id: ObjectId) -> Result<()> {
        let full = self.full_name(name)?;
        if !self.repo.objects().contains(id) {
            return Err(Error::not_found(format!("object {}", id)));
        }
        if self.is_tags() && refs::try_read_ref(self.repo.meta_dir(), &full)?.is_some() {
            return Err(Error::already_exists(format!("tag '{}'", name)));
        }
        refs::write_ref(self.repo.meta_dir(), &full, &RefTarget::Direct(id))
    }

    /// Delete the named branch or tag.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if the ref does not exist.
    /// * [`Error::InvalidArgument`] when deleting the branch `HEAD` is on.
    pub fn delete(&self, name: &str) -> Result<()> {
        if self.current_name()?.as_deref() == Some(name) {
            return Err(Error::invalid_argument(format!(
                "cannot delete branch '{}': HEAD points to it",
                name
            )));
        }
        refs::delete_ref(self.repo.meta_dir(), &self.full_name(name)?)
    }

    /// All short names under this prefix, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.iter()?.into_iter().map(|(name, _)| name).collect())
    }

    /// All `(short name, id)` pairs, sorted by name.
    pub fn iter(&self) -> Result<Vec<(String, ObjectId)>> {
        let namespace = self.prefix.trim_end_matches('/');
        let node = refs::list_refs(self.repo.meta_dir(), namespace)?;
        Ok(node.flatten(""))
    }

    /// The branch `HEAD` redirects to, if any.
    ///
    /// Returns `Ok(None)` when HEAD is detached, and always for tags. The
    /// branch need not exist yet.
    pub fn current_name(&self) -> Result<Option<String>> {
        if self.is_tags() {
            return Ok(None);
        }
        match refs::try_read_ref(self.repo.meta_dir(), HEAD)? {
            Some(RefTarget::Symbolic(target)) => {
                Ok(target.strip_prefix(self.prefix).map(str::to_string))
            }
            _ => Ok(None),
        }
    }

    /// Make `HEAD` redirect to the named branch.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for tags.
    pub fn set_current(&self, name: &str) -> Result<()> {
        if self.is_tags() {
            return Err(Error::invalid_argument("tags have no current entry"));
        }
        let full = self.full_name(name)?;
        refs::write_ref(self.repo.meta_dir(), HEAD, &RefTarget::Symbolic(full))
    }
}

