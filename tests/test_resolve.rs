mod common;

use std::collections::HashMap;

use sprig::*;

/// Two blob payloads whose ids share their first four hex digits.
fn colliding_blobs() -> (Vec<u8>, Vec<u8>) {
    let mut seen: HashMap<String, Vec<u8>> = HashMap::new();
    for i in 0u32.. {
        let data = format!("payload {}", i).into_bytes();
        let prefix = hash::hash_object(ObjectKind::Blob, &data).to_hex()[..4].to_string();
        if let Some(other) = seen.insert(prefix, data.clone()) {
            return (other, data);
        }
    }
    unreachable!()
}

#[test]
fn short_hash_disambiguation() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let (a, b) = colliding_blobs();
    let id_a = repo.store_object(&Object::Blob(Blob::new(a))).unwrap();
    let id_b = repo.store_object(&Object::Blob(Blob::new(b))).unwrap();
    let (hex_a, hex_b) = (id_a.to_hex(), id_b.to_hex());

    match repo.resolve(&hex_a[..4], None, true) {
        Err(Error::Ambiguous { spec, candidates }) => {
            assert_eq!(spec, &hex_a[..4]);
            assert_eq!(candidates.len(), 2);
            assert!(candidates.contains(&id_a));
            assert!(candidates.contains(&id_b));
        }
        other => panic!("expected Ambiguous, got {:?}", other),
    }

    let split = hex_a
        .bytes()
        .zip(hex_b.bytes())
        .position(|(x, y)| x != y)
        .unwrap();
    let unique = &hex_a[..split + 1];
    assert_eq!(repo.resolve(unique, None, true).unwrap(), Some(id_a));
}

#[test]
fn ambiguous_error_lists_candidates() {
    let a = hash::hash_object(ObjectKind::Blob, b"a");
    let b = hash::hash_object(ObjectKind::Blob, b"b");
    let msg = Error::ambiguous("abcd", vec![a, b]).to_string();
    assert!(msg.contains(&a.to_hex()));
    assert!(msg.contains(&b.to_hex()));
}

#[test]
fn empty_and_malformed_specs() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    assert!(matches!(repo.resolve("", None, true), Err(Error::InvalidArgument(_))));
    assert!(matches!(repo.resolve("   ", None, true), Err(Error::InvalidArgument(_))));
    assert!(matches!(repo.resolve("a b", None, true), Err(Error::InvalidArgument(_))));
    assert!(repo.resolve("deadbeef", None, true).unwrap_err().is_not_found());
    assert!(repo.resolve("no-such-branch", None, true).unwrap_err().is_not_found());
}

#[test]
fn head_branch_and_tag_names() {
    let dir = tempfile::tempdir().unwrap();
    let (repo, commit) = common::repo_with_commit(dir.path());

    assert_eq!(repo.resolve("HEAD", None, true).unwrap(), Some(commit));
    assert_eq!(repo.resolve("master", None, true).unwrap(), Some(commit));
    assert_eq!(repo.resolve("refs/heads/master", None, true).unwrap(), Some(commit));

    repo.create_tag("v1", "HEAD", None, None).unwrap();
    assert_eq!(repo.resolve("v1", None, true).unwrap(), Some(commit));
    assert_eq!(repo.resolve(&commit.to_hex(), None, true).unwrap(), Some(commit));
}

#[test]
fn unborn_head_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    assert!(repo.resolve("HEAD", None, true).unwrap_err().is_not_found());
    assert_eq!(repo.head_id().unwrap(), None);
}

#[test]
fn peeling_to_expected_kind() {
    let dir = tempfile::tempdir().unwrap();
    let (repo, commit) = common::repo_with_commit(dir.path());
    let tree = match repo.read_object(commit).unwrap() {
        Object::Commit(c) => c.tree,
        other => panic!("expected commit, got {:?}", other.kind()),
    };

    assert_eq!(repo.resolve("HEAD", Some(ObjectKind::Commit), true).unwrap(), Some(commit));
    assert_eq!(repo.resolve("HEAD", Some(ObjectKind::Tree), true).unwrap(), Some(tree));
    // Commit -> tree does not need `follow`.
    assert_eq!(repo.resolve("HEAD", Some(ObjectKind::Tree), false).unwrap(), Some(tree));

    let tag = repo
        .create_tag("v1", "HEAD", Some("release"), Some(common::author()))
        .unwrap();
    assert_ne!(tag, commit);
    assert_eq!(repo.resolve("v1", None, true).unwrap(), Some(tag));
    assert_eq!(repo.resolve("v1", Some(ObjectKind::Tag), true).unwrap(), Some(tag));
    assert_eq!(repo.resolve("v1", Some(ObjectKind::Commit), true).unwrap(), Some(commit));
    assert_eq!(repo.resolve("v1", Some(ObjectKind::Tree), true).unwrap(), Some(tree));

    // Without follow a tag is not peeled.
    assert_eq!(repo.resolve("v1", Some(ObjectKind::Commit), false).unwrap(), None);

    // A tree never leads to a blob.
    assert!(repo
        .resolve("HEAD", Some(ObjectKind::Blob), true)
        .unwrap_err()
        .is_not_found());
    assert_eq!(repo.resolve("HEAD", Some(ObjectKind::Blob), false).unwrap(), None);
}

#[test]
fn same_name_tag_and_branch_on_different_commits_is_ambiguous() {
    let dir = tempfile::tempdir().unwrap();
    let (repo, first) = common::repo_with_commit(dir.path());
    repo.create_tag("dup", "HEAD", None, None).unwrap();

    common::write_file(&repo, "hello.txt", b"changed");
    repo.stage(&["hello.txt"]).unwrap();
    let second = repo.commit("second", Some(common::author())).unwrap();
    repo.branches().set("dup", second).unwrap();

    match repo.resolve("dup", None, true) {
        Err(Error::Ambiguous { candidates, .. }) => {
            assert!(candidates.contains(&first));
            assert!(candidates.contains(&second));
        }
        other => panic!("expected Ambiguous, got {:?}", other),
    }
    assert_eq!(repo.resolve("refs/tags/dup", None, true).unwrap(), Some(first));
}

// ---------------------------------------------------------------------------
// Ref chains
// ---------------------------------------------------------------------------

#[test]
fn ref_cycle_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    repo.create_ref("refs/heads/a", RefTarget::Symbolic("refs/heads/b".into()))
        .unwrap();
    repo.create_ref("refs/heads/b", RefTarget::Symbolic("refs/heads/a".into()))
        .unwrap();

    assert!(matches!(
        refs::deref_ref(repo.meta_dir(), "refs/heads/a"),
        Err(Error::Corrupt(_))
    ));
    assert!(matches!(repo.resolve("a", None, true), Err(Error::Corrupt(_))));
}

#[test]
fn longer_cycle_through_head_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    repo.create_ref("heads/master", RefTarget::Symbolic("refs/heads/x".into()))
        .unwrap();
    repo.create_ref("heads/x", RefTarget::Symbolic("HEAD".into())).unwrap();
    assert!(matches!(repo.resolve("HEAD", None, true), Err(Error::Corrupt(_))));
}

#[test]
fn symbolic_chain_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let (repo, commit) = common::repo_with_commit(dir.path());
    repo.create_ref("refs/heads/alias", RefTarget::Symbolic("refs/heads/master".into()))
        .unwrap();
    repo.create_ref("refs/heads/alias2", RefTarget::Symbolic("refs/heads/alias".into()))
        .unwrap();
    assert_eq!(refs::deref_ref(repo.meta_dir(), "refs/heads/alias2").unwrap(), commit);
}

#[test]
fn garbage_ref_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    std::fs::write(repo.meta_dir().join("refs/heads/bad"), "not a hash\n").unwrap();
    assert!(matches!(repo.resolve("bad", None, true), Err(Error::Corrupt(_))));
}
