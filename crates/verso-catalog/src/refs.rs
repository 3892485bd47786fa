//! Reference resolution.
//!
//! A reference string denotes a branch (`master`), a branch's committed head
//! (`master:HEAD`), a position N commits before the head (`master~N`), or a
//! full commit id in hex. Resolution pins the reference to a branch, a
//! requested-commit variant, an effective sequence number, and the branch's
//! lineage, which together drive all visibility arithmetic.

use crate::error::{CatalogError, Result};
use crate::model::{BranchId, CommitId, CommitSeq, LineageCommit};
use crate::store::Tables;

use verso_core::{BranchName, RepositoryName};

/// Which state of a branch a reference requests.
///
/// A tagged variant, not a hierarchy: each variant has its own visibility
/// predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedCommit {
    /// The branch's staging area layered over its committed head.
    Uncommitted,
    /// The branch's committed head only.
    Committed,
    /// A specific commit sequence on the branch.
    At(CommitSeq),
}

/// A reference pinned to a branch and commit window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// The branch the reference lands on.
    pub branch_id: BranchId,
    /// The requested-commit variant.
    pub requested: RequestedCommit,
    /// Effective commit sequence for visibility: the branch head for
    /// `Uncommitted`/`Committed`, the requested sequence for `At`.
    pub seq: CommitSeq,
    /// How far into each ancestor branch this reference can see,
    /// nearest parent first.
    pub lineage: Vec<LineageCommit>,
}

impl ResolvedRef {
    /// Whether the reference includes the branch's uncommitted state.
    #[must_use]
    pub const fn includes_uncommitted(&self) -> bool {
        matches!(self.requested, RequestedCommit::Uncommitted)
    }

    /// The same reference restricted to committed state.
    #[must_use]
    pub fn committed_view(&self) -> Self {
        let mut r = self.clone();
        if r.requested == RequestedCommit::Uncommitted {
            r.requested = RequestedCommit::Committed;
        }
        r
    }
}

fn invalid(reference: &str, message: impl Into<String>) -> CatalogError {
    CatalogError::InvalidReference {
        reference: reference.to_string(),
        message: message.into(),
    }
}

/// Resolves a reference string within a repository.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidReference`] for malformed strings and
/// [`CatalogError::NotFound`] when the branch or commit does not exist.
pub fn resolve(tables: &Tables, repo: &RepositoryName, reference: &str) -> Result<ResolvedRef> {
    if reference.is_empty() {
        return Err(invalid(reference, "empty reference"));
    }

    if let Some((name, suffix)) = reference.split_once(':') {
        if suffix != "HEAD" {
            return Err(invalid(reference, "only ':HEAD' is supported after ':'"));
        }
        let branch = branch_of(tables, repo, reference, name)?;
        return Ok(ResolvedRef {
            branch_id: branch.0,
            requested: RequestedCommit::Committed,
            seq: branch.1,
            lineage: branch.2,
        });
    }

    if let Some((name, steps)) = reference.split_once('~') {
        let steps: u64 = steps
            .parse()
            .map_err(|_| invalid(reference, "expected '<branch>~N'"))?;
        let branch = branch_of(tables, repo, reference, name)?;
        if steps == 0 {
            return Ok(ResolvedRef {
                branch_id: branch.0,
                requested: RequestedCommit::Committed,
                seq: branch.1,
                lineage: branch.2,
            });
        }
        let seq = branch
            .1
            .checked_sub(steps)
            .filter(|seq| *seq >= 1)
            .ok_or_else(|| {
                CatalogError::not_found(format!("commit {steps} before head of {reference}"))
            })?;
        return Ok(ResolvedRef {
            branch_id: branch.0,
            requested: RequestedCommit::At(seq),
            seq,
            lineage: branch.2,
        });
    }

    // A bare name: branch first, commit id second.
    match BranchName::new(reference) {
        Ok(name) => match tables.branch_by_name(repo, &name) {
            Ok(branch) => {
                return Ok(ResolvedRef {
                    branch_id: branch.id,
                    requested: RequestedCommit::Uncommitted,
                    seq: branch.head_seq,
                    lineage: branch.lineage.clone(),
                });
            }
            Err(CatalogError::NotFound { .. }) if !CommitId::looks_like(reference) => {
                return Err(CatalogError::not_found(format!(
                    "branch {repo}/{reference}"
                )));
            }
            Err(CatalogError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        },
        Err(_) if CommitId::looks_like(reference) => {}
        Err(err) => return Err(invalid(reference, err.to_string())),
    }

    let id: CommitId = reference.parse()?;
    let commit = tables.commit(&id)?;
    if commit.repository != *repo {
        return Err(CatalogError::not_found(format!("commit {id} in {repo}")));
    }
    let branch = tables.branch(commit.branch_id)?;
    Ok(ResolvedRef {
        branch_id: branch.id,
        requested: RequestedCommit::At(commit.seq),
        seq: commit.seq,
        lineage: branch.lineage.clone(),
    })
}

/// The commit a resolved reference denotes, if any.
///
/// `Committed`/`Uncommitted` references denote the branch head (which, for a
/// branch without own commits, is the commit it was created from).
#[must_use]
pub fn commit_at(tables: &Tables, resolved: &ResolvedRef) -> Option<CommitId> {
    match resolved.requested {
        RequestedCommit::At(seq) => tables
            .commit_by_seq(resolved.branch_id, seq)
            .map(|c| c.id.clone()),
        RequestedCommit::Committed | RequestedCommit::Uncommitted => tables
            .branch(resolved.branch_id)
            .ok()
            .and_then(|b| b.head_commit.clone()),
    }
}

fn branch_of(
    tables: &Tables,
    repo: &RepositoryName,
    reference: &str,
    name: &str,
) -> Result<(BranchId, CommitSeq, Vec<LineageCommit>)> {
    let name = BranchName::new(name).map_err(|e| invalid(reference, e.to_string()))?;
    let branch = tables.branch_by_name(repo, &name)?;
    Ok((branch.id, branch.head_seq, branch.lineage.clone()))
}
