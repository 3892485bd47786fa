//! Branch revert: reset a branch to one of its own historical commits.
//!
//! The staging area is discarded; rows narrowed by commits after the target
//! become current again; rows born after the target are capped to an empty
//! range — they stay in the store but no window can see them. Commit records
//! above the target are dropped so the sequence stays monotonic when the
//! branch moves forward again.

use crate::error::{CatalogError, Result};
use crate::model::{Branch, MAX_COMMIT, UNCOMMITTED};
use crate::refs::{RequestedCommit, ResolvedRef};
use crate::store::{key_of, Tx};

/// Resets `branch` to the commit `target` resolved to.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidCommit`] unless the target is a specific
/// commit of this branch's own history.
pub fn revert_branch(tx: &mut Tx<'_>, branch: &Branch, target: &ResolvedRef) -> Result<()> {
    let RequestedCommit::At(target_seq) = target.requested else {
        return Err(CatalogError::InvalidCommit {
            message: "branch revert requires a specific commit".to_string(),
        });
    };
    if target.branch_id != branch.id {
        return Err(CatalogError::InvalidCommit {
            message: format!(
                "commit does not belong to branch {}",
                branch.name
            ),
        });
    }
    if target_seq > branch.head_seq {
        return Err(CatalogError::InvalidCommit {
            message: "cannot revert forward".to_string(),
        });
    }
    let target_commit = tx
        .tables()
        .commit_by_seq(branch.id, target_seq)
        .ok_or_else(|| CatalogError::InvalidCommit {
            message: format!("no commit at sequence {target_seq}"),
        })?
        .id
        .clone();

    // One pass over the branch's rows: discard staged state, hide rows born
    // after the target, resurrect rows deleted after it.
    let rows: Vec<_> = tx
        .tables()
        .rows_of_branch(branch.id)
        .map(|row| (key_of(row), row.min_commit, row.max_commit))
        .collect();
    for (key, min_commit, max_commit) in rows {
        if min_commit == UNCOMMITTED {
            tx.remove_entry(&key)?;
        } else if min_commit > target_seq {
            if max_commit > target_seq {
                tx.update_entry(&key, |r| r.max_commit = target_seq)?;
            }
        } else if max_commit >= target_seq && max_commit != MAX_COMMIT {
            tx.update_entry(&key, |r| r.max_commit = MAX_COMMIT)?;
        }
    }

    for seq in tx.tables().commit_seqs_above(branch.id, target_seq) {
        let id = tx
            .tables()
            .commit_by_seq(branch.id, seq)
            .map(|c| c.id.clone())
            .ok_or_else(|| CatalogError::internal("commit index out of sync"))?;
        tx.remove_commit(&id)?;
    }

    let mut reverted = branch.clone();
    reverted.head_seq = target_seq;
    reverted.head_commit = Some(target_commit);
    tx.update_branch(reverted)?;

    tracing::info!(
        repository = %branch.repository,
        branch = %branch.name,
        target = target_seq,
        "branch reverted"
    );
    Ok(())
}
