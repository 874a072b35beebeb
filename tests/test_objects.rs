mod common;

use std::io::Write;

use sprig::*;

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn plant(repo: &Repository, id: ObjectId, raw: &[u8]) {
    let path = repo.objects().object_path(id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, zlib(raw)).unwrap();
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn every_kind_round_trips_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());

    let blob = Object::Blob(Blob::new(b"hello\n".to_vec()));
    let blob_id = repo.store_object(&blob).unwrap();

    let tree = Object::Tree(Tree::new(vec![
        TreeEntry::new(MODE_BLOB, "b.txt", blob_id),
        TreeEntry::new(MODE_BLOB_EXEC, "a.sh", blob_id),
    ]));
    let tree_id = repo.store_object(&tree).unwrap();

    let commit = Object::Commit(Commit::new(tree_id, vec![], common::author(), "first\n"));
    let commit_id = repo.store_object(&commit).unwrap();

    let tag = Object::Tag(Tag::new(
        commit_id,
        ObjectKind::Commit,
        "v1",
        common::author(),
        "release\n",
    ));

    for obj in [blob, tree, commit, tag] {
        let id = repo.store_object(&obj).unwrap();
        assert_eq!(id, obj.id());
        let back = repo.read_object(id).unwrap();
        assert_eq!(back.kind(), obj.kind());
        assert_eq!(back.serialize(), obj.serialize());
    }
}

#[test]
fn tree_entries_are_sorted_before_encoding() {
    let id = hash::hash_object(ObjectKind::Blob, b"x");
    let a = Tree::new(vec![TreeEntry::new(MODE_BLOB, "b", id), TreeEntry::new(MODE_BLOB, "a", id)]);
    let b = Tree::new(vec![TreeEntry::new(MODE_BLOB, "a", id), TreeEntry::new(MODE_BLOB, "b", id)]);
    assert_eq!(a.serialize(), b.serialize());
    assert_eq!(a.entries()[0].name, b"a");
    assert!(a.serialize().starts_with(b"33188 a\0"));
}

#[test]
fn hashing_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let obj = Object::Blob(Blob::new(b"unsaved".to_vec()));
    let id = repo.objects().hash(&obj);
    assert!(!repo.objects().contains(id));
    assert!(repo.read_object(id).unwrap_err().is_not_found());
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn storing_twice_keeps_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let obj = Object::Blob(Blob::new(b"same".to_vec()));

    let first = repo.store_object(&obj).unwrap();
    let path = repo.objects().object_path(first);
    let written = std::fs::metadata(&path).unwrap().modified().unwrap();

    let second = repo.store_object(&obj).unwrap();
    assert_eq!(first, second);
    assert_eq!(common::loose_object_count(&repo), 1);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), written);
}

#[test]
fn object_path_uses_two_char_shard() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = repo.store_object(&Object::Blob(Blob::new(b"x".to_vec()))).unwrap();
    let hex = id.to_hex();
    let expected = repo.objects().root().join(&hex[..2]).join(&hex[2..]);
    assert!(expected.is_file());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn length_mismatch_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = hash::hash_object(ObjectKind::Blob, b"abc");
    plant(&repo, id, b"blob 5\0abc");
    assert!(matches!(repo.read_object(id), Err(Error::Corrupt(_))));
}

#[test]
fn unknown_kind_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = hash::hash_object(ObjectKind::Blob, b"zzz");
    plant(&repo, id, b"weird 3\0zzz");
    assert!(matches!(repo.read_object(id), Err(Error::Corrupt(_))));
}

#[test]
fn bad_compression_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = hash::hash_object(ObjectKind::Blob, b"q");
    let path = repo.objects().object_path(id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"not zlib at all").unwrap();
    assert!(matches!(repo.read_object(id), Err(Error::Corrupt(_))));
}

#[test]
fn malformed_tree_payload_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = repo.objects().store_raw(ObjectKind::Tree, b"100644 name\0short").unwrap();
    assert!(matches!(repo.read_object(id), Err(Error::Corrupt(_))));
}

// ---------------------------------------------------------------------------
// Prefix scan
// ---------------------------------------------------------------------------

#[test]
fn resolve_prefix_scans_one_shard() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = repo.store_object(&Object::Blob(Blob::new(b"p".to_vec()))).unwrap();
    let hex = id.to_hex();

    let found = repo.objects().resolve_prefix(&hex[..6]).unwrap();
    assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![id]);

    let upper = hex[..8].to_ascii_uppercase();
    assert!(repo.objects().resolve_prefix(&upper).unwrap().contains(&id));

    assert!(matches!(
        repo.objects().resolve_prefix(&hex[..3]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        repo.objects().resolve_prefix("xyz1"),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn full_length_prefix_needs_no_object() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let hex = "0123456789abcdef0123456789abcdef01234567";
    let found = repo.objects().resolve_prefix(hex).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found.iter().next().unwrap().to_hex(), hex);
}
