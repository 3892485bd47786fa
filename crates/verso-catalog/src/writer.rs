//! The mutation pipeline: create, delete, and uncommitted-state revert.
//!
//! Mutations touch only the branch's staging area plus, for supersession,
//! the `max_commit` of the row being replaced. The blob payload is written
//! by the client before the entry is recorded; nothing here calls the blob
//! store.

use chrono::{DateTime, Utc};

use crate::error::{CatalogError, Result};
use crate::model::{Branch, EntryRow, NewEntry, MAX_COMMIT, UNCOMMITTED};
use crate::refs::{RequestedCommit, ResolvedRef};
use crate::store::{key_of, Tx};
use crate::views::visible_row;

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CatalogError::InvalidPath {
            message: "path cannot be empty".to_string(),
        });
    }
    Ok(())
}

/// Stages a new object version on the branch.
///
/// An uncommitted row for the path is overwritten in place (clearing any
/// tombstone). A current committed row is narrowed to the branch head so the
/// new row supersedes it from the next commit onward.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidPath`] for an empty path.
pub fn create_entry(
    tx: &mut Tx<'_>,
    branch: &Branch,
    entry: NewEntry,
    now: DateTime<Utc>,
) -> Result<()> {
    validate_path(&entry.path)?;

    let row = EntryRow {
        branch_id: branch.id,
        path: entry.path,
        physical_address: entry.physical_address,
        size: entry.size,
        checksum: entry.checksum,
        creation_date: entry.creation_date.unwrap_or(now),
        metadata: entry.metadata,
        min_commit: UNCOMMITTED,
        max_commit: MAX_COMMIT,
        is_expired: false,
    };

    if tx.tables().uncommitted_row(branch.id, &row.path).is_some() {
        return tx.replace_entry(row);
    }

    if let Some(current) = tx.tables().current_committed(branch.id, &row.path) {
        let key = key_of(current);
        let head = branch.head_seq;
        tx.update_entry(&key, |r| r.max_commit = head)?;
    }
    tx.insert_entry(row)
}

/// Deletes a path from the branch's uncommitted view.
///
/// A staged row is removed outright; if a committed or lineage row would
/// still be visible, a tombstone is inserted so the path reads absent while
/// the sealed history stays intact.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no row is visible at the path.
pub fn delete_entry(
    tx: &mut Tx<'_>,
    branch: &Branch,
    path: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    validate_path(path)?;

    let mut removed_staged = false;
    if let Some(staged) = tx.tables().uncommitted_row(branch.id, path) {
        if staged.is_tombstone() {
            return Err(CatalogError::not_found(format!("entry {path}")));
        }
        let key = key_of(staged);
        tx.remove_entry(&key)?;
        removed_staged = true;
    }

    let committed_view = ResolvedRef {
        branch_id: branch.id,
        requested: RequestedCommit::Committed,
        seq: branch.head_seq,
        lineage: branch.lineage.clone(),
    };
    let shadowed = visible_row(tx.tables(), &committed_view, path)?;

    match shadowed {
        Some(row) => tx.insert_entry(EntryRow {
            branch_id: branch.id,
            path: path.to_string(),
            physical_address: row.physical_address,
            size: row.size,
            checksum: row.checksum,
            creation_date: now,
            metadata: row.metadata,
            min_commit: UNCOMMITTED,
            max_commit: 0,
            is_expired: false,
        }),
        None if removed_staged => Ok(()),
        None => Err(CatalogError::not_found(format!("entry {path}"))),
    }
}

/// Discards every staged row (tombstones included) under `prefix`,
/// restoring the committed and inherited view. Idempotent; reverting
/// nothing succeeds.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidPath`] for an empty prefix.
pub fn revert_entries(tx: &mut Tx<'_>, branch: &Branch, prefix: &str) -> Result<usize> {
    validate_path(prefix)?;
    let keys: Vec<_> = tx
        .tables()
        .rows_of_branch(branch.id)
        .filter(|row| row.is_uncommitted() && row.path.starts_with(prefix))
        .map(key_of)
        .collect();
    let count = keys.len();
    for key in keys {
        let removed = tx.remove_entry(&key)?;
        restore_narrowed(tx, branch, &removed.path)?;
    }
    Ok(count)
}

/// Single-path form of [`revert_entries`]: discards the staged row for
/// exactly `path`, if any.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidPath`] for an empty path.
pub fn revert_object(tx: &mut Tx<'_>, branch: &Branch, path: &str) -> Result<usize> {
    validate_path(path)?;
    let key = tx
        .tables()
        .uncommitted_row(branch.id, path)
        .map(key_of);
    match key {
        Some(key) => {
            tx.remove_entry(&key)?;
            restore_narrowed(tx, branch, path)?;
            Ok(1)
        }
        None => Ok(0),
    }
}

/// Undoes the narrowing a staged overwrite applied to the committed row it
/// superseded.
///
/// A staged row can only exist between its staging and the branch's next
/// commit, so a committed row narrowed exactly to the branch head was
/// narrowed by staging, never by a commit (commits narrow to `seq - 1` and
/// then advance the head past it).
fn restore_narrowed(tx: &mut Tx<'_>, branch: &Branch, path: &str) -> Result<()> {
    if branch.head_seq == 0 {
        return Ok(());
    }
    let key = tx
        .tables()
        .committed_candidate(branch.id, path, crate::model::CommitSeq::MAX)
        .filter(|row| row.max_commit == branch.head_seq)
        .map(key_of);
    if let Some(key) = key {
        tx.update_entry(&key, |r| r.max_commit = MAX_COMMIT)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::CatalogError;
    use crate::model::{NewEntry, MAX_COMMIT};
    use crate::testing::fixtures::{catalog_with_repo, REPO};
    use verso_core::RepositoryName;

    fn repo() -> RepositoryName {
        REPO.parse().unwrap()
    }

    #[test]
    fn test_staged_overwrite_keeps_one_current_row() {
        let (catalog, cancel) = catalog_with_repo();
        let master = "master".parse().unwrap();
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a1", 1, "c1"))
            .unwrap();
        catalog
            .commit(&cancel, &repo(), &master, "one", "tester", None)
            .unwrap();
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a2", 2, "c2"))
            .unwrap();
        // Staging twice overwrites in place.
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a3", 3, "c3"))
            .unwrap();

        catalog
            .store()
            .read_tx(&cancel, |tables| {
                let branch = tables.branch_by_name(&repo(), &master)?;
                let rows: Vec<_> = tables.rows_of_branch(branch.id).collect();
                assert_eq!(rows.len(), 2);
                let current: Vec<_> =
                    rows.iter().filter(|r| r.max_commit == MAX_COMMIT).collect();
                assert_eq!(current.len(), 1, "one current row per (branch, path)");
                assert_eq!(current[0].physical_address, "/a3");
                // The sealed row was narrowed to the head.
                assert!(rows.iter().any(|r| r.min_commit == 1 && r.max_commit == 1));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_of_committed_stages_a_tombstone() {
        let (catalog, cancel) = catalog_with_repo();
        let master = "master".parse().unwrap();
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a", 1, "c"))
            .unwrap();
        catalog
            .commit(&cancel, &repo(), &master, "seal", "tester", None)
            .unwrap();
        catalog.delete_entry(&cancel, &repo(), &master, "/f").unwrap();

        catalog
            .store()
            .read_tx(&cancel, |tables| {
                let branch = tables.branch_by_name(&repo(), &master)?;
                let staged = tables.uncommitted_row(branch.id, "/f").expect("tombstone");
                assert!(staged.is_tombstone());
                // The sealed row is untouched until commit.
                let sealed = tables.committed_candidate(branch.id, "/f", 1).unwrap();
                assert_eq!(sealed.max_commit, MAX_COMMIT);
                Ok(())
            })
            .unwrap();

        // Deleting a deleted path reads as absent.
        let err = catalog
            .delete_entry(&cancel, &repo(), &master, "/f")
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn test_delete_missing_path_is_not_found() {
        let (catalog, cancel) = catalog_with_repo();
        let master = "master".parse().unwrap();
        let err = catalog
            .delete_entry(&cancel, &repo(), &master, "/nope")
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn test_empty_path_and_prefix_are_invalid() {
        let (catalog, cancel) = catalog_with_repo();
        let master = "master".parse().unwrap();
        assert!(matches!(
            catalog.create_entry(&cancel, &repo(), &master, NewEntry::new("", "/a", 1, "c")),
            Err(CatalogError::InvalidPath { .. })
        ));
        assert!(matches!(
            catalog.revert_entries(&cancel, &repo(), &master, ""),
            Err(CatalogError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_revert_unnarrows_the_superseded_row() {
        let (catalog, cancel) = catalog_with_repo();
        let master = "master".parse().unwrap();
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a1", 1, "c1"))
            .unwrap();
        catalog
            .commit(&cancel, &repo(), &master, "seal", "tester", None)
            .unwrap();
        catalog
            .create_entry(&cancel, &repo(), &master, NewEntry::new("/f", "/a2", 2, "c2"))
            .unwrap();
        catalog
            .revert_entries(&cancel, &repo(), &master, "/f")
            .unwrap();

        catalog
            .store()
            .read_tx(&cancel, |tables| {
                let branch = tables.branch_by_name(&repo(), &master)?;
                let rows: Vec<_> = tables.rows_of_branch(branch.id).collect();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].max_commit, MAX_COMMIT);
                assert_eq!(rows[0].physical_address, "/a1");
                Ok(())
            })
            .unwrap();
    }
}
