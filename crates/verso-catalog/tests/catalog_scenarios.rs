//! End-to-end catalog scenarios: commits and uncommitted reads, lineage
//! inheritance, merges with and without conflicts, and path revert.

use verso_catalog::{
    Catalog, CatalogError, DifferenceKind, GetEntryParams, ListEntriesParams, Metadata, NewEntry,
};
use verso_core::{BranchName, CancelToken, RepositoryName};

fn repo_name() -> RepositoryName {
    "repo1".parse().unwrap()
}

fn branch(name: &str) -> BranchName {
    name.parse().unwrap()
}

fn new_catalog() -> (Catalog, CancelToken, RepositoryName) {
    let catalog = Catalog::new();
    let cancel = CancelToken::new();
    let repo = repo_name();
    catalog
        .create_repository(&cancel, &repo, "mem://bucket1", &branch("master"))
        .unwrap();
    (catalog, cancel, repo)
}

fn put(catalog: &Catalog, cancel: &CancelToken, repo: &RepositoryName, b: &str, path: &str) {
    catalog
        .create_entry(
            cancel,
            repo,
            &branch(b),
            NewEntry::new(path, format!("/addr{path}"), 10, format!("cs-{path}")),
        )
        .unwrap();
}

fn listed_paths(
    catalog: &Catalog,
    cancel: &CancelToken,
    repo: &RepositoryName,
    reference: &str,
    delimiter: &str,
) -> Vec<(String, bool)> {
    let result = catalog
        .list_entries(
            cancel,
            repo,
            reference,
            &ListEntriesParams {
                delimiter: delimiter.to_string(),
                amount: 100,
                ..ListEntriesParams::default()
            },
        )
        .unwrap();
    assert!(!result.has_more);
    result
        .entries
        .iter()
        .map(|e| (e.path.clone(), e.is_common_prefix))
        .collect()
}

// Scenario: commit three entries, stage a fourth; the uncommitted listing
// shows all four (one collapsed), the committed listing omits the staged one.
#[test]
fn commit_then_uncommitted_read() {
    let (catalog, cancel, repo) = new_catalog();

    for path in ["/file1", "/file2", "/file2/xxx"] {
        put(&catalog, &cancel, &repo, "master", path);
    }
    catalog
        .commit(&cancel, &repo, &branch("master"), "initial", "tester", None)
        .unwrap();
    put(&catalog, &cancel, &repo, "master", "/file4");

    let uncommitted = listed_paths(&catalog, &cancel, &repo, "master", "/");
    assert_eq!(
        uncommitted,
        vec![
            ("/file1".to_string(), false),
            ("/file2".to_string(), false),
            ("/file2/".to_string(), true),
            ("/file4".to_string(), false),
        ]
    );

    let committed = listed_paths(&catalog, &cancel, &repo, "master:HEAD", "/");
    assert_eq!(
        committed,
        vec![
            ("/file1".to_string(), false),
            ("/file2".to_string(), false),
            ("/file2/".to_string(), true),
        ]
    );
}

#[test]
fn entry_roundtrip_preserves_fields() {
    let (catalog, cancel, repo) = new_catalog();
    let mut metadata = Metadata::new();
    metadata.insert("content-type".to_string(), "text/plain".to_string());
    catalog
        .create_entry(
            &cancel,
            &repo,
            &branch("master"),
            NewEntry {
                path: "/file1".to_string(),
                physical_address: "/addr1".to_string(),
                size: 42,
                checksum: "abcd".to_string(),
                metadata: metadata.clone(),
                creation_date: None,
            },
        )
        .unwrap();
    catalog
        .commit(&cancel, &repo, &branch("master"), "initial", "tester", None)
        .unwrap();

    let entry = catalog
        .get_entry(&cancel, &repo, "master", "/file1", GetEntryParams::default())
        .unwrap();
    assert_eq!(entry.path, "/file1");
    assert_eq!(entry.physical_address, "/addr1");
    assert_eq!(entry.size, 42);
    assert_eq!(entry.checksum, "abcd");
    assert_eq!(entry.metadata, metadata);
    assert!(!entry.expired);
}

#[test]
fn create_then_delete_leaves_nothing() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/ghost");
    catalog
        .delete_entry(&cancel, &repo, &branch("master"), "/ghost")
        .unwrap();

    let err = catalog
        .get_entry(&cancel, &repo, "master", "/ghost", GetEntryParams::default())
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));

    // No tombstone either: a commit now has nothing to seal.
    let err = catalog
        .commit(&cancel, &repo, &branch("master"), "empty", "tester", None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::NothingToCommit));
}

// Scenario: a branch keeps seeing a file its parent deleted, until the
// deletion is merged down.
#[test]
fn branch_lineage_inheritance_and_merge() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/file1");
    catalog
        .commit(&cancel, &repo, &branch("master"), "add file1", "tester", None)
        .unwrap();

    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();

    catalog
        .delete_entry(&cancel, &repo, &branch("master"), "/file1")
        .unwrap();
    catalog
        .commit(&cancel, &repo, &branch("master"), "drop file1", "tester", None)
        .unwrap();

    // Deleted on master, still inherited by b1.
    assert!(catalog
        .get_entry(&cancel, &repo, "master", "/file1", GetEntryParams::default())
        .is_err());
    let inherited = catalog
        .get_entry(&cancel, &repo, "b1", "/file1", GetEntryParams::default())
        .unwrap();
    assert_eq!(inherited.physical_address, "/addr/file1");

    let outcome = catalog
        .merge(&cancel, &repo, "master", &branch("b1"), "tester", None, None)
        .unwrap();
    let merge_commit = outcome.commit.expect("merge should seal a commit");
    assert_eq!(outcome.summary.removed, 1);
    assert_eq!(merge_commit.parents.len(), 2);

    let err = catalog
        .get_entry(&cancel, &repo, "b1", "/file1", GetEntryParams::default())
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));
}

// Scenario: both branches rewrote the same path since their common ancestor.
#[test]
fn merge_conflict_leaves_rows_untouched() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/file0");
    catalog
        .commit(&cancel, &repo, &branch("master"), "base", "tester", None)
        .unwrap();
    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();

    catalog
        .create_entry(
            &cancel,
            &repo,
            &branch("master"),
            NewEntry::new("/file0", "/addr-master", 1, "m"),
        )
        .unwrap();
    catalog
        .commit(&cancel, &repo, &branch("master"), "master change", "tester", None)
        .unwrap();
    catalog
        .create_entry(
            &cancel,
            &repo,
            &branch("b1"),
            NewEntry::new("/file0", "/addr-b1", 1, "b"),
        )
        .unwrap();
    catalog
        .commit(&cancel, &repo, &branch("b1"), "b1 change", "tester", None)
        .unwrap();

    let differences = catalog.diff(&cancel, &repo, "master", "b1").unwrap();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].path, "/file0");
    assert_eq!(differences[0].kind, DifferenceKind::Conflict);

    let err = catalog
        .merge(&cancel, &repo, "master", &branch("b1"), "tester", None, None)
        .unwrap_err();
    let CatalogError::MergeConflict { conflicts } = err else {
        panic!("expected merge conflict");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "/file0");

    // Neither side moved.
    let master_view = catalog
        .get_entry(&cancel, &repo, "master", "/file0", GetEntryParams::default())
        .unwrap();
    assert_eq!(master_view.physical_address, "/addr-master");
    let b1_view = catalog
        .get_entry(&cancel, &repo, "b1", "/file0", GetEntryParams::default())
        .unwrap();
    assert_eq!(b1_view.physical_address, "/addr-b1");
}

#[test]
fn merge_twice_reports_no_changes() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/shared");
    catalog
        .commit(&cancel, &repo, &branch("master"), "base", "tester", None)
        .unwrap();
    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();
    put(&catalog, &cancel, &repo, "master", "/newer");
    catalog
        .commit(&cancel, &repo, &branch("master"), "newer", "tester", None)
        .unwrap();

    let first = catalog
        .merge(&cancel, &repo, "master", &branch("b1"), "tester", None, None)
        .unwrap();
    assert!(first.commit.is_some());
    assert_eq!(first.summary.added, 1);

    let second = catalog
        .merge(&cancel, &repo, "master", &branch("b1"), "tester", None, None)
        .unwrap();
    assert!(second.commit.is_none());
    assert_eq!(second.summary, verso_catalog::MergeSummary::default());
}

// Scenario: stage a create and a delete on top of sealed state, then revert
// the whole prefix; the committed state is back and the diff is empty.
#[test]
fn revert_path_restores_committed_state() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/a");
    put(&catalog, &cancel, &repo, "master", "/b");
    catalog
        .commit(&cancel, &repo, &branch("master"), "seal a and b", "tester", None)
        .unwrap();

    put(&catalog, &cancel, &repo, "master", "/a/new");
    catalog
        .delete_entry(&cancel, &repo, &branch("master"), "/b")
        .unwrap();

    catalog
        .revert_entries(&cancel, &repo, &branch("master"), "/")
        .unwrap();

    let paths = listed_paths(&catalog, &cancel, &repo, "master", "");
    assert_eq!(
        paths,
        vec![("/a".to_string(), false), ("/b".to_string(), false)]
    );
    assert!(catalog
        .diff(&cancel, &repo, "master:HEAD", "master")
        .unwrap()
        .is_empty());

    // Idempotent.
    catalog
        .revert_entries(&cancel, &repo, &branch("master"), "/")
        .unwrap();
    assert!(catalog
        .diff(&cancel, &repo, "master:HEAD", "master")
        .unwrap()
        .is_empty());
}

#[test]
fn revert_of_staged_overwrite_restores_sealed_version() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/file0");
    catalog
        .commit(&cancel, &repo, &branch("master"), "seal", "tester", None)
        .unwrap();

    catalog
        .create_entry(
            &cancel,
            &repo,
            &branch("master"),
            NewEntry::new("/file0", "/addr-staged", 2, "staged"),
        )
        .unwrap();
    catalog
        .revert_object(&cancel, &repo, &branch("master"), "/file0")
        .unwrap();

    let entry = catalog
        .get_entry(&cancel, &repo, "master", "/file0", GetEntryParams::default())
        .unwrap();
    assert_eq!(entry.physical_address, "/addr/file0");

    // The sealed row is current again: a later commit must not hide it.
    put(&catalog, &cancel, &repo, "master", "/other");
    catalog
        .commit(&cancel, &repo, &branch("master"), "later", "tester", None)
        .unwrap();
    assert!(catalog
        .get_entry(&cancel, &repo, "master:HEAD", "/file0", GetEntryParams::default())
        .is_ok());
}

#[test]
fn revert_branch_rewinds_history() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/keep");
    let first = catalog
        .commit(&cancel, &repo, &branch("master"), "first", "tester", None)
        .unwrap();

    put(&catalog, &cancel, &repo, "master", "/drop-me");
    catalog
        .delete_entry(&cancel, &repo, &branch("master"), "/keep")
        .unwrap();
    catalog
        .commit(&cancel, &repo, &branch("master"), "second", "tester", None)
        .unwrap();
    put(&catalog, &cancel, &repo, "master", "/staged");

    catalog
        .revert_branch(&cancel, &repo, &branch("master"), first.id.as_str())
        .unwrap();

    let paths = listed_paths(&catalog, &cancel, &repo, "master", "");
    assert_eq!(paths, vec![("/keep".to_string(), false)]);

    // History moves forward again with monotonic sequences.
    put(&catalog, &cancel, &repo, "master", "/fresh");
    let next = catalog
        .commit(&cancel, &repo, &branch("master"), "fresh", "tester", None)
        .unwrap();
    assert_eq!(next.seq, first.seq + 1);
    assert_eq!(next.parents, vec![first.id.clone()]);

    let log = catalog
        .log_commits(&cancel, &repo, &branch("master"), None, -1)
        .unwrap();
    let messages: Vec<&str> = log.commits.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["fresh", "first"]);
}

#[test]
fn revert_branch_rejects_foreign_commit() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/f");
    catalog
        .commit(&cancel, &repo, &branch("master"), "on master", "tester", None)
        .unwrap();
    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();
    put(&catalog, &cancel, &repo, "b1", "/g");
    let foreign = catalog
        .commit(&cancel, &repo, &branch("b1"), "on b1", "tester", None)
        .unwrap();

    let err = catalog
        .revert_branch(&cancel, &repo, &branch("master"), foreign.id.as_str())
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidCommit { .. }));
}

#[test]
fn commit_log_walks_both_merge_parents() {
    let (catalog, cancel, repo) = new_catalog();
    put(&catalog, &cancel, &repo, "master", "/base");
    catalog
        .commit(&cancel, &repo, &branch("master"), "base", "tester", None)
        .unwrap();
    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();
    put(&catalog, &cancel, &repo, "b1", "/feature");
    catalog
        .commit(&cancel, &repo, &branch("b1"), "feature", "tester", None)
        .unwrap();

    catalog
        .merge(&cancel, &repo, "b1", &branch("master"), "tester", None, None)
        .unwrap();

    let log = catalog
        .log_commits(&cancel, &repo, &branch("master"), None, -1)
        .unwrap();
    let messages: Vec<&str> = log.commits.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("merge"));
    assert!(messages.contains(&"feature"));
    assert!(messages.contains(&"base"));

    let limited = catalog
        .log_commits(&cancel, &repo, &branch("master"), None, 2)
        .unwrap();
    assert_eq!(limited.commits.len(), 2);
    assert!(limited.has_more);
}

#[test]
fn cancelled_token_aborts_before_any_change() {
    let (catalog, cancel, repo) = new_catalog();
    let doomed = CancelToken::new();
    doomed.cancel();
    let err = catalog
        .create_entry(
            &doomed,
            &repo,
            &branch("master"),
            NewEntry::new("/x", "/addr", 1, "c"),
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::Cancelled));

    // Nothing staged.
    let err = catalog
        .commit(&cancel, &repo, &branch("master"), "none", "tester", None)
        .unwrap_err();
    assert!(matches!(err, CatalogError::NothingToCommit));
}

#[test]
fn duplicate_branch_and_repository_conflict() {
    let (catalog, cancel, repo) = new_catalog();
    let err = catalog
        .create_repository(&cancel, &repo, "mem://other", &branch("master"))
        .unwrap_err();
    assert!(matches!(err, CatalogError::AlreadyExists { .. }));

    put(&catalog, &cancel, &repo, "master", "/f");
    catalog
        .commit(&cancel, &repo, &branch("master"), "m", "tester", None)
        .unwrap();
    catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap();
    let err = catalog
        .create_branch(&cancel, &repo, &branch("b1"), "master")
        .unwrap_err();
    assert!(matches!(err, CatalogError::AlreadyExists { .. }));
}
