//! Merge: apply a source reference's changes since the common ancestor onto
//! a destination branch and seal a merge commit.
//!
//! The conflict gate runs before any row changes: a changed path conflicts
//! when the destination also diverged from the ancestor on it and cannot
//! already see the source's version (directly or through lineage). Any
//! conflict aborts the whole merge; the conflict set is returned and no rows
//! move.

use chrono::{DateTime, Utc};

use crate::commit::commit_branch;
use crate::diff::{diff_refs, merge_base, same_object, Conflict, Difference, DifferenceKind};
use crate::error::{CatalogError, Result};
use crate::model::{Branch, CommitRecord, Metadata, NewEntry, Repository};
use crate::refs::{commit_at, RequestedCommit, ResolvedRef};
use crate::store::Tx;
use crate::views::visible_row;
use crate::writer;

/// Per-kind counts of the changes a merge applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Paths created on the destination.
    pub added: usize,
    /// Paths deleted from the destination.
    pub removed: usize,
    /// Paths whose content changed on the destination.
    pub changed: usize,
}

/// The result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The sealed merge commit; `None` when the source brought no changes.
    pub commit: Option<CommitRecord>,
    /// What was applied.
    pub summary: MergeSummary,
}

/// Merges `source` into the branch `destination`.
///
/// # Errors
///
/// Returns [`CatalogError::MergeConflict`] with the conflict set when any
/// changed path conflicts (no rows are changed), and
/// [`CatalogError::NoMergeBase`] when the references share no ancestor.
pub fn merge_into(
    tx: &mut Tx<'_>,
    repository: &Repository,
    source: &ResolvedRef,
    destination: &Branch,
    message: Option<&str>,
    committer: &str,
    metadata: Metadata,
    now: DateTime<Utc>,
) -> Result<MergeOutcome> {
    // Merges read the source's sealed state only.
    let source = source.committed_view();
    let source_commit = commit_at(tx.tables(), &source);

    let Some(source_commit) = source_commit else {
        // Nothing was ever committed on the source's chain.
        return Ok(MergeOutcome {
            commit: None,
            summary: MergeSummary::default(),
        });
    };

    let base = match &destination.head_commit {
        Some(dest_commit) => {
            let Some(base) = merge_base(tx.tables(), dest_commit, &source_commit)? else {
                return Err(CatalogError::NoMergeBase);
            };
            let base_branch = tx.tables().branch(base.branch_id)?;
            Some(ResolvedRef {
                branch_id: base.branch_id,
                requested: RequestedCommit::At(base.seq),
                seq: base.seq,
                lineage: base_branch.lineage.clone(),
            })
        }
        // A destination that never saw a commit diffs against the empty tree.
        None => None,
    };

    let changes = diff_refs(tx.tables(), base.as_ref(), &source, base.as_ref())?;
    if changes.is_empty() {
        return Ok(MergeOutcome {
            commit: None,
            summary: MergeSummary::default(),
        });
    }

    let dest_ref = ResolvedRef {
        branch_id: destination.id,
        requested: RequestedCommit::Uncommitted,
        seq: destination.head_seq,
        lineage: destination.lineage.clone(),
    };

    let mut conflicts: Vec<Conflict> = Vec::new();
    for change in &changes {
        let d = visible_row(tx.tables(), &dest_ref, &change.path)?;
        let s = visible_row(tx.tables(), &source, &change.path)?;
        let a = match &base {
            Some(base) => visible_row(tx.tables(), base, &change.path)?,
            None => None,
        };
        let destination_diverged = !same_object(d.as_ref(), a.as_ref());
        let sees_source_version = same_object(d.as_ref(), s.as_ref());
        if destination_diverged && !sees_source_version {
            conflicts.push(Conflict {
                path: change.path.clone(),
            });
        }
    }
    if !conflicts.is_empty() {
        tracing::info!(
            repository = %repository.name,
            destination = %destination.name,
            conflicts = conflicts.len(),
            "merge aborted on conflicts"
        );
        return Err(CatalogError::MergeConflict { conflicts });
    }

    let mut summary = MergeSummary::default();
    for Difference { kind, path } in &changes {
        let d = visible_row(tx.tables(), &dest_ref, path)?;
        let s = visible_row(tx.tables(), &source, path)?;
        if same_object(d.as_ref(), s.as_ref()) {
            // Already transitively visible to the destination.
            continue;
        }
        match kind {
            DifferenceKind::Removed => {
                writer::delete_entry(tx, destination, path, now)?;
                summary.removed += 1;
            }
            DifferenceKind::Added | DifferenceKind::Changed | DifferenceKind::Conflict => {
                let row = s.ok_or_else(|| {
                    CatalogError::internal(format!("source row for {path} vanished during merge"))
                })?;
                writer::create_entry(
                    tx,
                    destination,
                    NewEntry {
                        path: path.clone(),
                        physical_address: row.physical_address,
                        size: row.size,
                        checksum: row.checksum,
                        metadata: row.metadata,
                        creation_date: Some(row.creation_date),
                    },
                    now,
                )?;
                if matches!(kind, DifferenceKind::Added) {
                    summary.added += 1;
                } else {
                    summary.changed += 1;
                }
            }
        }
    }

    if summary == MergeSummary::default() {
        return Ok(MergeOutcome {
            commit: None,
            summary,
        });
    }

    let default_message = format!(
        "merge {} into {}",
        source_commit,
        destination.name
    );
    let commit = commit_branch(
        tx,
        destination,
        message.unwrap_or(&default_message),
        committer,
        metadata,
        Some(source_commit),
        now,
    )?;

    tracing::info!(
        repository = %repository.name,
        destination = %destination.name,
        commit = %commit.id,
        added = summary.added,
        removed = summary.removed,
        changed = summary.changed,
        "merge sealed"
    );
    Ok(MergeOutcome {
        commit: Some(commit),
        summary,
    })
}
