use std::fmt::Write as _;
use std::path::PathBuf;

use crate::hash::ObjectId;

/// All errors produced by sprig.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous reference {spec}: candidates are:{}", list_candidates(.candidates))]
    Ambiguous {
        spec: String,
        candidates: Vec<ObjectId>,
    },

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not empty: {0}")]
    NotEmpty(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn list_candidates(candidates: &[ObjectId]) -> String {
    let mut out = String::new();
    for id in candidates {
        let _ = write!(out, "\n - {}", id);
    }
    out
}

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn ambiguous(spec: impl Into<String>, candidates: Vec<ObjectId>) -> Self {
        Self::Ambiguous {
            spec: spec.into(),
            candidates,
        }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn not_empty(what: impl Into<String>) -> Self {
        Self::NotEmpty(what.into())
    }

    /// Wrap an I/O error, prefixing the message with the offending path.
    ///
    /// A missing file keeps its `NotFound` kind so callers can still match
    /// on [`Error::is_not_found`].
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// `true` for [`Error::NotFound`] and for I/O errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}
