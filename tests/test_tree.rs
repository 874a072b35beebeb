mod common;

use sprig::*;

fn populate(repo: &Repository) {
    common::write_file(repo, "README", b"readme\n");
    common::write_file(repo, "src/main.rs", b"fn main() {}\n");
    common::write_file(repo, "src/util/mod.rs", b"\n");
    common::write_file(repo, "docs/guide.md", b"# guide\n");
}

#[test]
fn unchanged_directory_builds_same_tree() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);

    let first = repo.build_tree(".", false).unwrap();
    let second = repo.build_tree(".", false).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.serialize(), second.serialize());
}

#[test]
fn metadata_directory_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);

    let tree = repo.build_tree(".", false).unwrap();
    let names: Vec<String> = tree.entries().iter().map(|e| e.name_lossy()).collect();
    assert_eq!(names, vec!["README", "docs", "src"]);
}

#[test]
fn content_change_deep_down_changes_root() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);

    let before = repo.build_tree(".", false).unwrap();
    common::write_file(&repo, "src/util/mod.rs", b"pub mod x;\n");
    let after = repo.build_tree(".", false).unwrap();

    assert_ne!(before.id(), after.id());
    assert_eq!(before.get(b"README"), after.get(b"README"));
    assert_eq!(before.get(b"docs"), after.get(b"docs"));
    assert_ne!(before.get(b"src").unwrap().id, after.get(b"src").unwrap().id);
}

#[test]
fn subtrees_are_stored_blobs_only_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);

    let tree = repo.build_tree(".", false).unwrap();
    let src = tree.get(b"src").unwrap();
    assert!(src.is_tree());
    assert!(repo.objects().contains(src.id));
    let readme = tree.get(b"README").unwrap();
    assert!(!repo.objects().contains(readme.id));
    assert!(!repo.objects().contains(tree.id()));

    let tree = repo.build_tree(".", true).unwrap();
    assert!(repo.objects().contains(tree.get(b"README").unwrap().id));
}

#[cfg(unix)]
#[test]
fn modes_are_os_mode_bits() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    common::write_file(&repo, "run.sh", b"#!/bin/sh\n");
    let script = repo.worktree().join("run.sh");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::os::unix::fs::symlink("run.sh", repo.worktree().join("link")).unwrap();

    let tree = repo.build_tree(".", false).unwrap();
    let run = tree.get(b"run.sh").unwrap();
    assert_eq!(run.mode, 0o100755);
    assert_eq!(run.file_type(), Some(FileType::Executable));

    let link = tree.get(b"link").unwrap();
    assert_eq!(link.file_type(), Some(FileType::Link));
    assert_eq!(link.id, hash::hash_object(ObjectKind::Blob, b"run.sh"));
}

#[test]
fn build_tree_rejects_files_and_outside_paths() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);
    assert!(matches!(repo.build_tree("README", false), Err(Error::InvalidArgument(_))));
    assert!(matches!(repo.build_tree(dir.path(), false), Err(Error::InvalidArgument(_))));
}

#[test]
fn write_tree_matches_build_tree_after_staging_everything() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);

    repo.stage(&[repo.worktree().to_path_buf()]).unwrap();
    let written = repo.write_tree().unwrap();
    let built = repo.build_tree(".", false).unwrap();
    assert_eq!(written, built.id());
    assert!(repo.objects().contains(written));
}

#[test]
fn write_tree_nests_staged_files() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    populate(&repo);
    repo.stage(&["README", "src/util/mod.rs"]).unwrap();

    let root = repo.write_tree().unwrap();
    let listing: Vec<String> = repo
        .read_tree_recursive(root)
        .unwrap()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(listing, vec!["README", "src/util/mod.rs"]);

    let tree = tree::read_tree(repo.objects(), root).unwrap();
    let src = tree.get(b"src").unwrap();
    assert_eq!(src.mode, MODE_TREE);
}

#[test]
fn empty_index_writes_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let repo = common::create_repo(dir.path());
    let id = repo.write_tree().unwrap();
    assert_eq!(id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}
