//! End-to-end repository workflows: commits, branches, checkout and merge.

use std::fs;
use std::path::Path;

use dgit_core::{ManualClock, MergeOutcome, RepoConfig, RepoError, Repository};
use tempfile::TempDir;

fn init(dir: &Path) -> Repository {
    Repository::init_with(dir, RepoConfig::default(), Box::new(ManualClock::new(1_000, 10))).unwrap()
}

fn write(repo: &Repository, name: &str, data: &str) {
    fs::write(repo.work_dir().join(name), data).unwrap();
}

fn read(repo: &Repository, name: &str) -> Option<String> {
    fs::read_to_string(repo.work_dir().join(name)).ok()
}

fn commit_file(repo: &mut Repository, name: &str, data: &str, message: &str) {
    write(repo, name, data);
    repo.add(name).unwrap();
    repo.commit(message).unwrap();
}

fn messages(repo: &Repository) -> Vec<String> {
    repo.log()
        .unwrap()
        .iter()
        .map(|c| c.message().to_string())
        .collect()
}

#[test]
fn test_two_commits_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    commit_file(&mut repo, "f.txt", "hello", "one");
    commit_file(&mut repo, "f.txt", "hello again", "two");
    assert_eq!(messages(&repo), vec!["two", "one", "initial commit"]);
    repo.save().unwrap();
    drop(repo);

    let repo = Repository::open(tmp.path()).unwrap();
    assert_eq!(messages(&repo), vec!["two", "one", "initial commit"]);
    assert_eq!(repo.global_log().unwrap().len(), 3);
    let head = repo.head_commit().unwrap();
    let blob = head.blob("f.txt").unwrap();
    assert_eq!(repo.blobs().get(&blob).unwrap(), b"hello again");
}

#[test]
fn test_unsaved_changes_are_discarded() {
    let tmp = TempDir::new().unwrap();
    let repo = init(tmp.path());
    drop(repo);

    let mut repo = Repository::open(tmp.path()).unwrap();
    commit_file(&mut repo, "f.txt", "lost", "never saved");
    drop(repo);

    let repo = Repository::open(tmp.path()).unwrap();
    assert_eq!(messages(&repo), vec!["initial commit"]);
}

#[test]
fn test_branches_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    repo.create_branch("other").unwrap();
    repo.checkout_branch("other").unwrap();
    commit_file(&mut repo, "g.txt", "only on other", "add g");

    repo.checkout_branch("master").unwrap();
    assert!(read(&repo, "g.txt").is_none());
    assert_eq!(messages(&repo), vec!["initial commit"]);

    repo.checkout_branch("other").unwrap();
    assert_eq!(read(&repo, "g.txt").as_deref(), Some("only on other"));
    assert_eq!(repo.head(), "other");
}

#[test]
fn test_every_branch_points_at_a_stored_commit() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    commit_file(&mut repo, "a.txt", "a", "a");
    repo.create_branch("side").unwrap();
    commit_file(&mut repo, "b.txt", "b", "b");
    repo.checkout_branch("side").unwrap();
    commit_file(&mut repo, "c.txt", "c", "c");
    repo.merge("master").unwrap();

    for tip in repo.branches().values() {
        assert!(repo.graph().contains(tip));
        repo.graph().get(tip).unwrap();
    }
    assert!(repo.branches().contains_key(repo.head()));
}

#[test]
fn test_merge_disjoint_changes() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    repo.create_branch("b").unwrap();
    commit_file(&mut repo, "a.txt", "from master", "master adds a");
    let master_tip = repo.head_commit().unwrap().id();

    repo.checkout_branch("b").unwrap();
    assert!(read(&repo, "a.txt").is_none());
    commit_file(&mut repo, "b.txt", "from b", "b adds b");
    let b_tip = repo.head_commit().unwrap().id();

    repo.checkout_branch("master").unwrap();
    let outcome = repo.merge("b").unwrap();
    let MergeOutcome::Merged { commit, conflicts } = outcome else {
        panic!("expected a merge commit");
    };
    assert!(conflicts.is_empty());
    assert_eq!(commit.parents(), &[master_tip, b_tip]);
    assert_eq!(commit.message(), "Merged b into master.");
    assert!(commit.tracks("a.txt"));
    assert!(commit.tracks("b.txt"));
    assert_eq!(read(&repo, "a.txt").as_deref(), Some("from master"));
    assert_eq!(read(&repo, "b.txt").as_deref(), Some("from b"));
    assert!(repo.staging().is_empty());
}

#[test]
fn test_merge_conflict_writes_markers() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    commit_file(&mut repo, "f.txt", "foo\n", "foo");
    repo.create_branch("other").unwrap();
    commit_file(&mut repo, "f.txt", "bar\n", "bar");
    repo.checkout_branch("other").unwrap();
    commit_file(&mut repo, "f.txt", "baz\n", "baz");
    repo.checkout_branch("master").unwrap();

    let outcome = repo.merge("other").unwrap();
    assert!(outcome.has_conflicts());
    let MergeOutcome::Merged { commit, conflicts } = outcome else {
        panic!("expected a merge commit");
    };
    assert_eq!(conflicts, vec!["f.txt".to_string()]);
    assert!(commit.is_merge());

    let expected = "<<<<<<< HEAD\nbar\n=======\nbaz\n>>>>>>>\n";
    assert_eq!(read(&repo, "f.txt").as_deref(), Some(expected));
    let blob = commit.blob("f.txt").unwrap();
    assert_eq!(repo.blobs().get(&blob).unwrap(), expected.as_bytes());
}

#[test]
fn test_merge_removes_file_deleted_on_given_branch() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    commit_file(&mut repo, "keep.txt", "k", "keep");
    commit_file(&mut repo, "doomed.txt", "d", "doomed");
    repo.create_branch("cleanup").unwrap();
    commit_file(&mut repo, "keep.txt", "k2", "master edits keep");

    repo.checkout_branch("cleanup").unwrap();
    repo.rm("doomed.txt").unwrap();
    repo.commit("remove doomed").unwrap();
    repo.checkout_branch("master").unwrap();
    assert_eq!(read(&repo, "doomed.txt").as_deref(), Some("d"));

    let MergeOutcome::Merged { commit, conflicts } = repo.merge("cleanup").unwrap() else {
        panic!("expected a merge commit");
    };
    assert!(conflicts.is_empty());
    assert!(!commit.tracks("doomed.txt"));
    assert!(read(&repo, "doomed.txt").is_none());
    assert_eq!(read(&repo, "keep.txt").as_deref(), Some("k2"));
}

#[test]
fn test_merge_fast_forward_and_up_to_date() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    repo.create_branch("dev").unwrap();
    repo.checkout_branch("dev").unwrap();
    commit_file(&mut repo, "d.txt", "dev work", "dev work");
    let dev_tip = repo.head_commit().unwrap().id();
    repo.checkout_branch("master").unwrap();

    assert_eq!(repo.merge("dev").unwrap(), MergeOutcome::FastForward(dev_tip));
    assert_eq!(repo.branch_tip("master").unwrap(), dev_tip);
    assert_eq!(read(&repo, "d.txt").as_deref(), Some("dev work"));
    assert_eq!(repo.global_log().unwrap().len(), 2);

    assert_eq!(repo.merge("dev").unwrap(), MergeOutcome::UpToDate);
}

#[test]
fn test_merge_preconditions() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    assert!(matches!(repo.merge("ghost"), Err(RepoError::BranchNotFound(_))));
    assert!(matches!(repo.merge("master"), Err(RepoError::MergeWithSelf)));

    repo.create_branch("other").unwrap();
    write(&repo, "pending.txt", "p");
    repo.add("pending.txt").unwrap();
    assert!(matches!(repo.merge("other"), Err(RepoError::UncommittedChanges)));
}

#[test]
fn test_merge_refuses_to_clobber_untracked_file() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    repo.create_branch("other").unwrap();
    commit_file(&mut repo, "m.txt", "m", "master");
    repo.checkout_branch("other").unwrap();
    commit_file(&mut repo, "u.txt", "theirs", "other adds u");
    repo.checkout_branch("master").unwrap();
    let before = repo.head_commit().unwrap().id();

    write(&repo, "u.txt", "mine");
    assert!(matches!(
        repo.merge("other"),
        Err(RepoError::UntrackedFileInTheWay(name)) if name == "u.txt"
    ));
    assert_eq!(read(&repo, "u.txt").as_deref(), Some("mine"));
    assert_eq!(repo.head_commit().unwrap().id(), before);
}

#[test]
fn test_status_sections() {
    let tmp = TempDir::new().unwrap();
    let mut repo = init(tmp.path());
    commit_file(&mut repo, "tracked.txt", "t", "tracked");
    commit_file(&mut repo, "gone.txt", "g", "gone");
    repo.create_branch("other").unwrap();

    write(&repo, "staged.txt", "s");
    repo.add("staged.txt").unwrap();
    repo.rm("gone.txt").unwrap();
    write(&repo, "tracked.txt", "edited");
    write(&repo, "loose.txt", "l");

    let status = repo.status().unwrap();
    assert_eq!(status.head, "master");
    assert_eq!(status.branches, vec!["master", "other"]);
    assert_eq!(status.staged, vec!["staged.txt"]);
    assert_eq!(status.removed, vec!["gone.txt"]);
    assert_eq!(status.unstaged.len(), 1);
    assert_eq!(status.unstaged[0].0, "tracked.txt");
    assert_eq!(status.unstaged[0].1.to_string(), "modified");
    assert_eq!(status.untracked, vec!["loose.txt"]);
}
