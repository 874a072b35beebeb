//! The staging index: a binary, checksummed list of tracked paths.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! "DIRC" | version: u32 = 2 | entry count: u32
//! per entry:
//!   ctime_sec ctime_nsec mtime_sec mtime_nsec dev ino mode uid gid size  (10 x u32)
//!   object id (20 bytes) | flags: u16 | path | NUL padding to a multiple of 8
//! SHA-1 of everything above (20 bytes)
//! ```

use std::fs::Metadata;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hash::{self, ObjectId, ID_LEN};
use crate::paths::atomic_write;
use crate::types::FileType;

pub const SIGNATURE: &[u8; 4] = b"DIRC";
pub const VERSION: u32 = 2;

const HEADER_LEN: usize = 12;
/// Fixed-size part of an entry, before the path.
const ENTRY_FIXED_LEN: usize = 62;
const CHECKSUM_LEN: usize = ID_LEN;

/// Low 12 bits of the flags word: path length, saturating at `0xFFF`.
pub const FLAG_NAME_MASK: u16 = 0x0FFF;
pub const FLAG_STAGE_MASK: u16 = 0x3000;
pub const FLAG_EXTENDED: u16 = 0x4000;
pub const FLAG_ASSUME_VALID: u16 = 0x8000;

/// One tracked path with the metadata it had when it was staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_sec: u32,
    pub ctime_nsec: u32,
    pub mtime_sec: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub id: ObjectId,
    pub flags: u16,
    /// Worktree-relative, `/`-separated.
    pub path: String,
}

impl IndexEntry {
    /// An entry with zeroed stat data and flags derived from `path`.
    pub fn new(path: impl Into<String>, mode: u32, id: ObjectId) -> Self {
        let path = path.into();
        Self {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            id,
            flags: name_len_bits(&path),
            path,
        }
    }

    /// An entry carrying the live stat data of a file or directory.
    ///
    /// Values wider than 32 bits are truncated, as the on-disk format
    /// only keeps the low 32 bits.
    pub fn from_metadata(path: impl Into<String>, id: ObjectId, meta: &Metadata) -> Self {
        let mut entry = Self::new(path, crate::tree::mode_from_metadata(meta), id);

        let mtime = filetime::FileTime::from_last_modification_time(meta);
        entry.mtime_sec = mtime.unix_seconds() as u32;
        entry.mtime_nsec = mtime.nanoseconds();
        entry.size = meta.len() as u32;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            entry.ctime_sec = meta.ctime() as u32;
            entry.ctime_nsec = meta.ctime_nsec() as u32;
            entry.dev = meta.dev() as u32;
            entry.ino = meta.ino() as u32;
            entry.uid = meta.uid();
            entry.gid = meta.gid();
        }
        #[cfg(not(unix))]
        {
            let ctime = filetime::FileTime::from_creation_time(meta).unwrap_or(mtime);
            entry.ctime_sec = ctime.unix_seconds() as u32;
            entry.ctime_nsec = ctime.nanoseconds();
        }

        entry
    }

    pub fn name_len(&self) -> u16 {
        self.flags & FLAG_NAME_MASK
    }

    pub fn stage(&self) -> u16 {
        (self.flags & FLAG_STAGE_MASK) >> 12
    }

    pub fn assume_valid(&self) -> bool {
        self.flags & FLAG_ASSUME_VALID != 0
    }

    pub fn extended(&self) -> bool {
        self.flags & FLAG_EXTENDED != 0
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    /// Encoded size of this entry including padding.
    pub fn encoded_len(&self) -> usize {
        padded_len(self.path.len())
    }
}

fn name_len_bits(path: &str) -> u16 {
    path.len().min(FLAG_NAME_MASK as usize) as u16
}

/// Fixed part + path + at least one NUL, rounded up to a multiple of 8.
fn padded_len(path_len: usize) -> usize {
    (ENTRY_FIXED_LEN + path_len + 8) / 8 * 8
}

/// Locate `path` in a sorted entry list.
pub fn find_entry<'a>(entries: &'a [IndexEntry], path: &str) -> Option<&'a IndexEntry> {
    entries
        .binary_search_by(|e| e.path.as_str().cmp(path))
        .ok()
        .map(|i| &entries[i])
}

fn check_sorted(entries: &[IndexEntry]) -> Result<()> {
    for pair in entries.windows(2) {
        if pair[0].path >= pair[1].path {
            return Err(Error::invalid_argument(format!(
                "index entries must be sorted with unique paths: {:?} precedes {:?}",
                pair[0].path, pair[1].path
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode entries into the full index file image, checksum included.
///
/// The name-length bits of each entry's flags are recomputed from its path;
/// all other flag bits are written as given.
///
/// # Errors
/// [`Error::InvalidArgument`] if entries are not sorted by path, a path is
/// empty or contains NUL, or there are more than `u32::MAX` entries.
pub fn encode_index(entries: &[IndexEntry]) -> Result<Vec<u8>> {
    check_sorted(entries)?;
    let count = u32::try_from(entries.len())
        .map_err(|_| Error::invalid_argument("too many index entries"))?;

    let body: usize = entries.iter().map(IndexEntry::encoded_len).sum();
    let mut buf = Vec::with_capacity(HEADER_LEN + body + CHECKSUM_LEN);
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());

    for entry in entries {
        if entry.path.is_empty() || entry.path.contains('\0') {
            return Err(Error::invalid_argument(format!(
                "invalid index path {:?}",
                entry.path
            )));
        }
        let start = buf.len();
        for field in [
            entry.ctime_sec,
            entry.ctime_nsec,
            entry.mtime_sec,
            entry.mtime_nsec,
            entry.dev,
            entry.ino,
            entry.mode,
            entry.uid,
            entry.gid,
            entry.size,
        ] {
            buf.extend_from_slice(&field.to_be_bytes());
        }
        buf.extend_from_slice(entry.id.as_bytes());
        let flags = (entry.flags & !FLAG_NAME_MASK) | name_len_bits(&entry.path);
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(entry.path.as_bytes());
        buf.resize(start + entry.encoded_len(), 0);
    }

    let checksum = hash::sha1_bytes(&buf);
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Decode a full index file image.
///
/// The trailing checksum is verified before anything else is interpreted.
///
/// # Errors
/// * [`Error::Corrupt`] for a checksum mismatch, a wrong signature, a
///   truncated entry, bad padding, unsorted paths, or bytes left over after
///   the declared number of entries.
/// * [`Error::InvalidArgument`] for a version other than 2.
pub fn decode_index(data: &[u8]) -> Result<Vec<IndexEntry>> {
    if data.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(Error::corrupt(format!(
            "index is {} bytes, shorter than header plus checksum",
            data.len()
        )));
    }

    let body_end = data.len() - CHECKSUM_LEN;
    let expected = hash::sha1_bytes(&data[..body_end]);
    if expected.as_bytes()[..] != data[body_end..] {
        return Err(Error::corrupt("index checksum mismatch"));
    }

    if &data[..4] != SIGNATURE {
        return Err(Error::corrupt(format!(
            "bad index signature {:?}",
            String::from_utf8_lossy(&data[..4])
        )));
    }
    let version = be_u32(data, 4);
    if version != VERSION {
        return Err(Error::invalid_argument(format!(
            "unsupported index version {}",
            version
        )));
    }
    let count = be_u32(data, 8) as usize;

    let mut entries = Vec::with_capacity(count.min(body_end / ENTRY_FIXED_LEN));
    let mut pos = HEADER_LEN;
    for i in 0..count {
        if pos + ENTRY_FIXED_LEN > body_end {
            return Err(Error::corrupt(format!(
                "index entry {} of {} is truncated",
                i + 1,
                count
            )));
        }
        let f = |n: usize| be_u32(data, pos + n * 4);
        let id = ObjectId::from_slice(&data[pos + 40..pos + 60])?;
        let flags = u16::from_be_bytes([data[pos + 60], data[pos + 61]]);

        let path_start = pos + ENTRY_FIXED_LEN;
        let path_end = data[path_start..body_end]
            .iter()
            .position(|&b| b == 0)
            .map(|n| path_start + n)
            .ok_or_else(|| Error::corrupt(format!("index entry {} path is unterminated", i + 1)))?;
        let path = std::str::from_utf8(&data[path_start..path_end])
            .map_err(|_| Error::corrupt(format!("index entry {} path is not UTF-8", i + 1)))?
            .to_string();
        if path.is_empty() {
            return Err(Error::corrupt(format!("index entry {} has an empty path", i + 1)));
        }
        if flags & FLAG_NAME_MASK != name_len_bits(&path) {
            return Err(Error::corrupt(format!(
                "index entry {:?} name length {} disagrees with its flags",
                path,
                path.len()
            )));
        }

        let entry_end = pos + padded_len(path.len());
        if entry_end > body_end {
            return Err(Error::corrupt(format!("index entry {:?} is truncated", path)));
        }
        if data[path_end..entry_end].iter().any(|&b| b != 0) {
            return Err(Error::corrupt(format!(
                "index entry {:?} has non-NUL padding",
                path
            )));
        }

        entries.push(IndexEntry {
            ctime_sec: f(0),
            ctime_nsec: f(1),
            mtime_sec: f(2),
            mtime_nsec: f(3),
            dev: f(4),
            ino: f(5),
            mode: f(6),
            uid: f(7),
            gid: f(8),
            size: f(9),
            id,
            flags,
            path,
        });
        pos = entry_end;
    }

    if pos != body_end {
        return Err(Error::corrupt(format!(
            "{} unexpected bytes after {} index entries",
            body_end - pos,
            count
        )));
    }
    check_sorted(&entries).map_err(|e| Error::corrupt(e.to_string()))?;

    Ok(entries)
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Read and decode the index file at `path`.
///
/// # Errors
/// [`Error::NotFound`] if the file does not exist, plus everything
/// [`decode_index`] reports.
pub fn read_index(path: &Path) -> Result<Vec<IndexEntry>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("index file {}", path.display())));
        }
        Err(e) => return Err(Error::io(path, e)),
    };
    decode_index(&data)
}

/// Replace the index file at `path` with `entries`.
///
/// The file is written to a temporary sibling and renamed into place.
pub fn write_index(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    let data = encode_index(entries)?;
    atomic_write(path, &data)?;
    log::debug!("wrote index with {} entries to {}", entries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use crate::types::MODE_BLOB;

    fn entry(path: &str) -> IndexEntry {
        let mut e = IndexEntry::new(path, MODE_BLOB, hash::hash_object(ObjectKind::Blob, path.as_bytes()));
        e.mtime_sec = 1_700_000_000;
        e.mtime_nsec = 123;
        e.size = 7;
        e
    }

    #[test]
    fn header_layout() {
        let data = encode_index(&[entry("a.txt")]).unwrap();
        assert_eq!(&data[..4], b"DIRC");
        assert_eq!(&data[4..8], &[0, 0, 0, 2]);
        assert_eq!(&data[8..12], &[0, 0, 0, 1]);
    }

    #[test]
    fn entries_are_padded_to_eight_bytes() {
        for len in 1..=17 {
            let path = "x".repeat(len);
            let data = encode_index(&[entry(&path)]).unwrap();
            let body = data.len() - HEADER_LEN - CHECKSUM_LEN;
            assert_eq!(body % 8, 0, "path length {}", len);
            assert!(body >= ENTRY_FIXED_LEN + len + 1);
            assert!(body < ENTRY_FIXED_LEN + len + 1 + 8);
        }
    }

    #[test]
    fn empty_index_decodes() {
        let data = encode_index(&[]).unwrap();
        assert_eq!(data.len(), HEADER_LEN + CHECKSUM_LEN);
        assert!(decode_index(&data).unwrap().is_empty());
    }

    #[test]
    fn decode_inverts_encode() {
        let entries = vec![entry("a.txt"), entry("dir/b.txt"), entry("dir/c")];
        let data = encode_index(&entries).unwrap();
        assert_eq!(decode_index(&data).unwrap(), entries);
        assert_eq!(encode_index(&decode_index(&data).unwrap()).unwrap(), data);
    }

    #[test]
    fn long_paths_saturate_name_length() {
        let long = "d/".repeat(2100) + "f";
        let e = entry(&long);
        assert_eq!(e.name_len(), 0xFFF);
        let data = encode_index(&[e.clone()]).unwrap();
        assert_eq!(decode_index(&data).unwrap(), vec![e]);
    }

    #[test]
    fn flag_bits() {
        let mut e = entry("a");
        e.flags |= FLAG_ASSUME_VALID | (2 << 12);
        assert!(e.assume_valid());
        assert!(!e.extended());
        assert_eq!(e.stage(), 2);
        assert_eq!(e.name_len(), 1);
    }

    #[test]
    fn unsorted_entries_are_rejected() {
        let err = encode_index(&[entry("b"), entry("a")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = encode_index(&[entry("a"), entry("a")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    fn reseal(mut data: Vec<u8>) -> Vec<u8> {
        let end = data.len() - CHECKSUM_LEN;
        data.truncate(end);
        let sum = hash::sha1_bytes(&data);
        data.extend_from_slice(sum.as_bytes());
        data
    }

    #[test]
    fn unsupported_version_is_invalid_argument() {
        let mut data = encode_index(&[entry("a")]).unwrap();
        data[7] = 3;
        let err = decode_index(&reseal(data)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn bad_signature_is_corrupt() {
        let mut data = encode_index(&[entry("a")]).unwrap();
        data[0] = b'X';
        let err = decode_index(&reseal(data)).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn count_mismatch_is_corrupt() {
        let mut data = encode_index(&[entry("a"), entry("b")]).unwrap();
        data[11] = 3;
        assert!(matches!(decode_index(&reseal(data.clone())), Err(Error::Corrupt(_))));
        data[11] = 1;
        assert!(matches!(decode_index(&reseal(data)), Err(Error::Corrupt(_))));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        assert!(matches!(decode_index(b"DIRC"), Err(Error::Corrupt(_))));
    }
}
