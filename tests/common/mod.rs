use std::path::Path;

use sprig::*;

pub fn create_repo(dir: &Path) -> Repository {
    Repository::init(dir.join("work"), InitOptions::default()).unwrap()
}

#[allow(dead_code)]
pub fn author() -> Signature {
    Signature::new("Ada Lovelace", "ada@example.com", 1_700_000_000, 60)
}

#[allow(dead_code)]
pub fn write_file(repo: &Repository, rel: &str, data: &[u8]) {
    let path = repo.worktree().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, data).unwrap();
}

/// A repo with `hello.txt`, `dir/a.txt` and `dir/b.txt` staged and
/// committed on `master`.
#[allow(dead_code)]
pub fn repo_with_commit(dir: &Path) -> (Repository, ObjectId) {
    let repo = create_repo(dir);
    write_file(&repo, "hello.txt", b"hello");
    write_file(&repo, "dir/a.txt", b"aaa");
    write_file(&repo, "dir/b.txt", b"bbb");
    repo.stage(&["hello.txt", "dir/a.txt", "dir/b.txt"]).unwrap();
    let commit = repo.commit("initial", Some(author())).unwrap();
    (repo, commit)
}

#[allow(dead_code)]
pub fn loose_object_count(repo: &Repository) -> usize {
    walkdir::WalkDir::new(repo.objects().root())
        .min_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
