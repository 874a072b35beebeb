//! Revision resolution: turning `HEAD`, hashes, short hashes and branch or
//! tag names into object ids.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::hash::{self, ObjectId, HEX_LEN};
use crate::object::{Object, ObjectKind};
use crate::odb::MIN_PREFIX_LEN;
use crate::paths::validate_ref_name;
use crate::refs::{self, HEAD, HEADS_PREFIX, TAGS_PREFIX};
use crate::repo::Repository;

/// Every object id `spec` could name, without looking at object kinds.
///
/// Hex specs of 4 to 40 digits are matched against stored objects first;
/// when no object matches, and for every other spec, the name is tried as
/// a full ref name, a tag and a branch.
pub fn candidates(repo: &Repository, spec: &str) -> Result<BTreeSet<ObjectId>> {
    if spec == HEAD {
        return Ok(BTreeSet::from([refs::deref_ref(repo.meta_dir(), HEAD)?]));
    }

    if hash::is_hex(spec) && (MIN_PREFIX_LEN..=HEX_LEN).contains(&spec.len()) {
        let found = repo.objects().resolve_prefix(spec)?;
        if !found.is_empty() {
            return Ok(found);
        }
        log::trace!("no object matches {}, trying ref names", spec);
    }

    let mut found = BTreeSet::new();
    let mut names = vec![format!("{}{}", TAGS_PREFIX, spec), format!("{}{}", HEADS_PREFIX, spec)];
    if spec.starts_with("refs/") {
        names.insert(0, spec.to_string());
    }
    for name in names {
        validate_ref_name(&name)
            .map_err(|_| Error::invalid_argument(format!("malformed revision {:?}", spec)))?;
        match refs::deref_ref(repo.meta_dir(), &name) {
            Ok(id) => {
                found.insert(id);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(found)
}

/// Resolve `spec` to a single object id.
///
/// Without `expected`, the id `spec` names is returned as-is. With
/// `expected`, objects are peeled until one of that kind is reached: a
/// commit yields its tree when a tree is expected, and a tag yields its
/// target when `follow` is set. If peeling cannot reach the expected kind
/// the result is [`Error::NotFound`] when `follow` is set and `Ok(None)`
/// otherwise.
///
/// # Errors
/// * [`Error::InvalidArgument`] for an empty or malformed spec.
/// * [`Error::NotFound`] when nothing matches.
/// * [`Error::Ambiguous`] when a short hash or name matches several objects;
///   the error carries every candidate.
pub fn resolve(
    repo: &Repository,
    spec: &str,
    expected: Option<ObjectKind>,
    follow: bool,
) -> Result<Option<ObjectId>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::invalid_argument("empty revision"));
    }

    let found = candidates(repo, spec)?;
    if found.len() > 1 {
        return Err(Error::ambiguous(spec, found.into_iter().collect()));
    }
    let mut id = found
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("revision {}", spec)))?;

    let expected = match expected {
        None => return Ok(Some(id)),
        Some(kind) => kind,
    };

    loop {
        let obj = repo.read_object(id)?;
        if obj.kind() == expected {
            return Ok(Some(id));
        }
        id = match obj {
            Object::Tag(tag) if follow => tag.target,
            Object::Commit(commit) if expected == ObjectKind::Tree => commit.tree,
            other => {
                log::debug!("{} is a {}, not a {}", id, other.kind(), expected);
                if follow {
                    return Err(Error::not_found(format!(
                        "{} does not lead to a {}",
                        spec, expected
                    )));
                }
                return Ok(None);
            }
        };
    }
}
