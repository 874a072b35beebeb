//! A small content-addressed version-control core.
//!
//! `sprig` keeps a worktree's history in a `.sprig` directory laid out like
//! a git repository: zlib-compressed loose objects addressed by SHA-1, a
//! binary staging index, and plain-text refs.
//!
//! # Key types
//!
//! - [`Repository`] — creates, opens or discovers a repository and exposes
//!   the store/read/resolve/stage/status operations.
//! - [`ObjectStore`] — the loose object database under `objects/`.
//! - [`Object`] — the closed set of object kinds: [`Blob`], [`Tree`],
//!   [`Commit`], [`Tag`].
//! - [`IndexEntry`] — one staged path in the binary index.
//! - [`RefDict`] — dictionary-like access to branches or tags.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use sprig::{InitOptions, Repository, Signature};
//!
//! let repo = Repository::init("/tmp/my-work", InitOptions::default()).unwrap();
//! std::fs::write("/tmp/my-work/a.txt", "hi").unwrap();
//! repo.stage(&["a.txt"]).unwrap();
//!
//! let status = repo.compute_status().unwrap();
//! assert!(status.is_clean());
//!
//! let author = Signature::now("Ada", "ada@example.com");
//! let commit = repo.commit("first", Some(author)).unwrap();
//! assert_eq!(repo.rev_parse("HEAD", None).unwrap(), commit);
//! ```

pub mod commit;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod object;
pub mod odb;
pub mod paths;
pub mod refdict;
pub mod refs;
pub mod repo;
pub mod resolve;
pub mod status;
pub mod tree;
pub mod types;

// Re-export primary public types at crate root.
pub use commit::{Commit, Signature, Tag};
pub use config::Config;
pub use error::{Error, Result};
pub use hash::ObjectId;
pub use index::IndexEntry;
pub use object::{Blob, Object, ObjectKind};
pub use odb::ObjectStore;
pub use refdict::RefDict;
pub use repo::{Repository, METADATA_DIR};
pub use tree::{Tree, TreeEntry};
pub use types::*;
