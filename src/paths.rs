use std::io::Write;
use std::path::{Component, Path};

use crate::error::{Error, Result};

/// Normalize a worktree-relative path: convert `\` to `/`, strip a leading
/// `./`, drop `.` segments and collapse repeated slashes.
///
/// An empty input (or one made only of `.` and `/`) returns an empty string,
/// meaning the worktree root.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if the path contains `..` segments.
pub fn normalize_path(path: &str) -> Result<String> {
    let unified = path.replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(Error::invalid_argument(format!(
                "path segment '..' is not allowed in {:?}",
                path,
            )));
        }
        segments.push(seg);
    }

    Ok(segments.join("/"))
}

/// Express `path` relative to the worktree `root` in normalized form.
///
/// Relative inputs are taken as relative to `root`.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `path` lies outside `root`.
pub fn worktree_relative(root: &Path, path: &Path) -> Result<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| {
            Error::invalid_argument(format!(
                "{} is outside the worktree {}",
                path.display(),
                root.display()
            ))
        })?
    } else {
        path
    };

    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(seg) => parts.push(seg.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(Error::invalid_argument(format!(
                    "{} is outside the worktree {}",
                    path.display(),
                    root.display()
                )))
            }
        }
    }
    normalize_path(&parts.join("/"))
}

/// Validate a ref name such as `refs/heads/main` or `HEAD`.
///
/// Rejects spaces, control characters, `..`, `@{`, empty segments, a
/// leading `/`, a trailing `.` and a `.lock` suffix per git's
/// `check-ref-format` rules.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if the name violates any rule.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("ref name must not be empty"));
    }

    for ch in name.chars() {
        if ch.is_control() {
            return Err(Error::invalid_argument(format!(
                "ref name contains a control character: {:?}",
                name,
            )));
        }
        match ch {
            ':' | ' ' | '\\' | '^' | '~' | '?' | '*' | '[' => {
                return Err(Error::invalid_argument(format!(
                    "ref name contains invalid character: {:?}",
                    ch,
                )));
            }
            _ => {}
        }
    }

    if name.contains("..") {
        return Err(Error::invalid_argument("ref name must not contain '..'"));
    }

    if name.contains("@{") {
        return Err(Error::invalid_argument("ref name must not contain '@{'"));
    }

    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(Error::invalid_argument(
            "ref name must not have empty path segments",
        ));
    }

    if name.ends_with('.') {
        return Err(Error::invalid_argument("ref name must not end with '.'"));
    }

    if name.ends_with(".lock") {
        return Err(Error::invalid_argument("ref name must not end with '.lock'"));
    }

    Ok(())
}

/// Write `data` to `target` through a temporary file in the same directory,
/// then rename it into place, so readers see either the old or the new
/// contents and never a partial file. Parent directories are created.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::invalid_argument(format!("{} has no parent", target.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))?;
    tmp.write_all(data).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(target).map_err(|e| Error::io(target, e.error))?;
    Ok(())
}
