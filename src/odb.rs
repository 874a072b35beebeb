//! Loose object storage under `objects/<2-hex>/<38-hex>`.
//!
//! Each file holds the zlib-compressed canonical encoding of one object.
//! Files are written once and never modified.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::hash::{self, ObjectId, HEX_LEN};
use crate::object::{self, Object, ObjectKind};
use crate::paths::atomic_write;

/// Shortest hex prefix [`ObjectStore::resolve_prefix`] accepts.
pub const MIN_PREFIX_LEN: usize = 4;

/// Content-addressed store rooted at a repository's `objects/` directory.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: objects_dir.into(),
        }
    }

    /// The `objects/` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the loose file for `id`: `objects/ab/cdef...`.
    pub fn object_path(&self, id: ObjectId) -> PathBuf {
        let hex = id.to_hex();
        let (shard, rest) = hex.split_at(2);
        self.root.join(shard).join(rest)
    }

    /// The id `obj` would be stored under, without writing anything.
    pub fn hash(&self, obj: &Object) -> ObjectId {
        obj.id()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Store an object and return its id.
    ///
    /// Storing content that is already present is a no-op; concurrent
    /// writers of the same object produce identical bytes at the same path.
    pub fn store(&self, obj: &Object) -> Result<ObjectId> {
        self.store_raw(obj.kind(), &obj.serialize())
    }

    /// Store an already-serialized payload of the given kind.
    pub fn store_raw(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let encoded = hash::encode_object(kind, payload);
        let id = hash::sha1_bytes(&encoded);
        let path = self.object_path(id);

        if path.exists() {
            log::trace!("object {} already stored", id);
            return Ok(id);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded).map_err(|e| Error::io(&path, e))?;
        let compressed = encoder.finish().map_err(|e| Error::io(&path, e))?;

        atomic_write(&path, &compressed)?;
        log::debug!("stored {} {} ({} bytes)", kind, id, payload.len());
        Ok(id)
    }

    /// Read the decompressed canonical encoding stored under `id`.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if no object file exists.
    /// * [`Error::Corrupt`] if the file is not valid zlib data.
    pub fn read_encoded(&self, id: ObjectId) -> Result<Vec<u8>> {
        let path = self.object_path(id);
        let compressed = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("object {}", id)));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };

        let mut raw = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut raw)
            .map_err(|e| Error::corrupt(format!("object {}: bad compression: {}", id, e)))?;
        Ok(raw)
    }

    /// Read and decode the object stored under `id`.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if no object file exists.
    /// * [`Error::Corrupt`] for a malformed header, a length mismatch or an
    ///   unknown kind tag.
    pub fn read(&self, id: ObjectId) -> Result<Object> {
        let raw = self.read_encoded(id)?;
        let (kind, payload) = object::split_header(&raw)?;
        Object::deserialize(kind, payload)
    }

    /// Read only the kind of the object stored under `id`.
    pub fn read_kind(&self, id: ObjectId) -> Result<ObjectKind> {
        let raw = self.read_encoded(id)?;
        let (kind, _) = object::split_header(&raw)?;
        Ok(kind)
    }

    /// All stored ids starting with the hex `prefix`.
    ///
    /// A full 40-character id is returned as-is without touching the disk.
    /// Shorter prefixes scan the shard directory named by their first two
    /// characters.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `prefix` is not hex or is shorter than
    /// [`MIN_PREFIX_LEN`].
    pub fn resolve_prefix(&self, prefix: &str) -> Result<BTreeSet<ObjectId>> {
        if !hash::is_hex(prefix) || prefix.len() > HEX_LEN {
            return Err(Error::invalid_argument(format!(
                "'{}' is not a hex object id prefix",
                prefix
            )));
        }
        if prefix.len() < MIN_PREFIX_LEN {
            return Err(Error::invalid_argument(format!(
                "object id prefix '{}' is shorter than {} characters",
                prefix, MIN_PREFIX_LEN
            )));
        }

        let prefix = prefix.to_ascii_lowercase();
        let mut found = BTreeSet::new();
        if prefix.len() == HEX_LEN {
            found.insert(ObjectId::from_hex(&prefix)?);
            return Ok(found);
        }

        let (shard, rest) = prefix.split_at(2);
        let shard_dir = self.root.join(shard);
        let listing = match std::fs::read_dir(&shard_dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(Error::io(&shard_dir, e)),
        };

        for dent in listing {
            let dent = dent.map_err(|e| Error::io(&shard_dir, e))?;
            let name = dent.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            // Skip temp files and anything else that is not an object.
            if name.len() != HEX_LEN - 2 || !hash::is_hex(name) {
                continue;
            }
            if name.starts_with(rest) {
                found.insert(ObjectId::from_hex(&format!("{}{}", shard, name))?);
            }
        }
        Ok(found)
    }
}
