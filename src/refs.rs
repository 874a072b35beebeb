//! Ref files under the metadata directory.
//!
//! A ref is a one-line file: either a 40-hex object id or a redirect of the
//! form `ref: <other ref name>`. Names are relative to the metadata
//! directory (`HEAD`, `refs/heads/main`, `refs/tags/v1`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::paths::{atomic_write, validate_ref_name};
use crate::types::{RefNode, RefTarget};

/// Marker that starts a redirect line.
pub const SYMREF_PREFIX: &str = "ref: ";

pub const HEAD: &str = "HEAD";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";

fn ref_path(meta_dir: &Path, name: &str) -> PathBuf {
    let mut path = meta_dir.to_path_buf();
    path.extend(name.split('/'));
    path
}

/// Parse the contents of a ref file.
pub fn parse_ref(name: &str, contents: &str) -> Result<RefTarget> {
    let line = contents.trim_end_matches(['\n', '\r']);
    if let Some(target) = line.strip_prefix("ref:") {
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::corrupt(format!("ref {} redirects to an empty name", name)));
        }
        return Ok(RefTarget::Symbolic(target.to_string()));
    }
    ObjectId::from_hex(line.trim())
        .map(RefTarget::Direct)
        .map_err(|_| Error::corrupt(format!("ref {} holds neither an id nor a redirect: {:?}", name, line)))
}

/// Read a ref file without following redirects, or `None` if it is absent.
pub fn try_read_ref(meta_dir: &Path, name: &str) -> Result<Option<RefTarget>> {
    validate_ref_name(name)?;
    let path = ref_path(meta_dir, name);
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_ref(name, &contents).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        // A directory at the ref path (e.g. `refs/heads` itself) is not a ref.
        Err(_) if path.is_dir() => Ok(None),
        Err(e) => Err(Error::io(&path, e)),
    }
}

/// Read a ref file without following redirects.
///
/// # Errors
/// [`Error::NotFound`] if the ref does not exist.
pub fn read_ref(meta_dir: &Path, name: &str) -> Result<RefTarget> {
    try_read_ref(meta_dir, name)?.ok_or_else(|| Error::not_found(format!("ref {}", name)))
}

/// Follow redirects from `name` to the last ref in the chain.
///
/// Returns that ref's name together with its id, or `None` for the id when
/// the last ref does not exist yet (an unborn branch).
///
/// # Errors
/// [`Error::Corrupt`] if the chain revisits a name.
pub fn resolve_chain(meta_dir: &Path, name: &str) -> Result<(String, Option<ObjectId>)> {
    let mut visited = HashSet::new();
    let mut current = name.to_string();
    loop {
        if !visited.insert(current.clone()) {
            return Err(Error::corrupt(format!(
                "ref cycle: {} redirects back to {}",
                name, current
            )));
        }
        match try_read_ref(meta_dir, &current)? {
            None => return Ok((current, None)),
            Some(RefTarget::Direct(id)) => return Ok((current, Some(id))),
            Some(RefTarget::Symbolic(next)) => {
                log::trace!("ref {} -> {}", current, next);
                current = next;
            }
        }
    }
}

/// Resolve `name` to an object id, following redirects.
///
/// # Errors
/// * [`Error::NotFound`] if any ref in the chain is missing.
/// * [`Error::Corrupt`] on a cycle or a malformed ref file.
pub fn deref_ref(meta_dir: &Path, name: &str) -> Result<ObjectId> {
    match resolve_chain(meta_dir, name)? {
        (_, Some(id)) => Ok(id),
        (last, None) if last == name => Err(Error::not_found(format!("ref {}", name))),
        (last, None) => Err(Error::not_found(format!("ref {} (via {})", last, name))),
    }
}

/// Write a ref file, replacing any previous contents atomically.
pub fn write_ref(meta_dir: &Path, name: &str, target: &RefTarget) -> Result<()> {
    validate_ref_name(name)?;
    let line = match target {
        RefTarget::Direct(id) => format!("{}\n", id),
        RefTarget::Symbolic(to) => {
            validate_ref_name(to)?;
            if to == name {
                return Err(Error::invalid_argument(format!("ref {} cannot redirect to itself", name)));
            }
            format!("{}{}\n", SYMREF_PREFIX, to)
        }
    };
    atomic_write(&ref_path(meta_dir, name), line.as_bytes())?;
    log::debug!("ref {} = {}", name, line.trim_end());
    Ok(())
}

/// Point the ref at the end of `name`'s redirect chain at `id`.
///
/// Returns the name of the ref that was written, which differs from `name`
/// when `name` is symbolic (e.g. `HEAD` advancing `refs/heads/main`).
pub fn update_ref(meta_dir: &Path, name: &str, id: ObjectId) -> Result<String> {
    let (last, _) = resolve_chain(meta_dir, name)?;
    write_ref(meta_dir, &last, &RefTarget::Direct(id))?;
    Ok(last)
}

/// Remove a ref file. Redirects are not followed.
///
/// # Errors
/// [`Error::NotFound`] if the ref does not exist.
pub fn delete_ref(meta_dir: &Path, name: &str) -> Result<()> {
    validate_ref_name(name)?;
    let path = ref_path(meta_dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("deleted ref {}", name);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::not_found(format!("ref {}", name)))
        }
        Err(e) => Err(Error::io(&path, e)),
    }
}

/// Tree of every ref below `namespace` (e.g. `refs`), each resolved to an id.
///
/// Redirects whose chain ends at a missing ref are left out. A missing
/// namespace directory yields an empty tree.
pub fn list_refs(meta_dir: &Path, namespace: &str) -> Result<RefNode> {
    let dir = ref_path(meta_dir, namespace);
    if !dir.is_dir() {
        return Ok(RefNode::Dir(BTreeMap::new()));
    }
    list_dir(meta_dir, &dir, namespace)
}

fn list_dir(meta_dir: &Path, dir: &Path, prefix: &str) -> Result<RefNode> {
    let mut children = BTreeMap::new();
    let listing = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for dent in listing {
        let dent = dent.map_err(|e| Error::io(dir, e))?;
        let name = match dent.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        // Temporary files from interrupted writes.
        if name.starts_with('.') {
            continue;
        }
        let full = format!("{}/{}", prefix, name);
        let ft = dent.file_type().map_err(|e| Error::io(dent.path(), e))?;
        if ft.is_dir() {
            children.insert(name, list_dir(meta_dir, &dent.path(), &full)?);
            continue;
        }
        match deref_ref(meta_dir, &full) {
            Ok(id) => {
                children.insert(name, RefNode::Ref(id));
            }
            Err(Error::NotFound(what)) => log::debug!("skipping dangling ref {}: {}", full, what),
            Err(e) => return Err(e),
        }
    }
    Ok(RefNode::Dir(children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_object;
    use crate::object::ObjectKind;

    fn id(n: u8) -> ObjectId {
        hash_object(ObjectKind::Blob, &[n])
    }

    #[test]
    fn parse_direct_and_symbolic() {
        let oid = id(1);
        assert_eq!(parse_ref("x", &format!("{}\n", oid)).unwrap(), RefTarget::Direct(oid));
        assert_eq!(
            parse_ref("HEAD", "ref: refs/heads/main\n").unwrap(),
            RefTarget::Symbolic("refs/heads/main".into())
        );
        assert!(matches!(parse_ref("x", "garbage\n"), Err(Error::Corrupt(_))));
        assert!(matches!(parse_ref("x", "ref: \n"), Err(Error::Corrupt(_))));
    }

    #[test]
    fn chain_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path();
        write_ref(meta, "refs/heads/main", &RefTarget::Direct(id(1))).unwrap();
        write_ref(meta, "HEAD", &RefTarget::Symbolic("refs/heads/main".into())).unwrap();
        assert_eq!(deref_ref(meta, "HEAD").unwrap(), id(1));

        assert_eq!(update_ref(meta, "HEAD", id(2)).unwrap(), "refs/heads/main");
        assert_eq!(deref_ref(meta, "refs/heads/main").unwrap(), id(2));
        assert_eq!(
            read_ref(meta, "HEAD").unwrap(),
            RefTarget::Symbolic("refs/heads/main".into())
        );
    }

    #[test]
    fn unborn_branch() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path();
        write_ref(meta, "HEAD", &RefTarget::Symbolic("refs/heads/main".into())).unwrap();
        assert_eq!(
            resolve_chain(meta, "HEAD").unwrap(),
            ("refs/heads/main".to_string(), None)
        );
        assert!(deref_ref(meta, "HEAD").unwrap_err().is_not_found());
    }

    #[test]
    fn self_redirect_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_ref(dir.path(), "refs/heads/a", &RefTarget::Symbolic("refs/heads/a".into()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(delete_ref(dir.path(), "refs/heads/nope").unwrap_err().is_not_found());
    }

    #[test]
    fn list_nests_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path();
        write_ref(meta, "refs/heads/main", &RefTarget::Direct(id(1))).unwrap();
        write_ref(meta, "refs/heads/feature/x", &RefTarget::Direct(id(2))).unwrap();
        write_ref(meta, "refs/tags/v1", &RefTarget::Direct(id(3))).unwrap();
        write_ref(meta, "refs/heads/gone", &RefTarget::Symbolic("refs/heads/missing".into())).unwrap();

        let flat = list_refs(meta, "refs").unwrap().flatten("refs");
        assert_eq!(
            flat,
            vec![
                ("refs/heads/feature/x".to_string(), id(2)),
                ("refs/heads/main".to_string(), id(1)),
                ("refs/tags/v1".to_string(), id(3)),
            ]
        );
    }
}
