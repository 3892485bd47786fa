//! The catalog facade: entity CRUD plus every versioning operation, each
//! running inside exactly one store transaction.

use chrono::Utc;

use verso_core::{catalog_span, BranchName, CancelToken, RepositoryName};

use crate::commit::{commit_branch, log_commits, CommitLogResult};
use crate::config::CatalogConfig;
use crate::diff::{diff_refs, Difference};
use crate::error::{CatalogError, Result};
use crate::merge::{merge_into, MergeOutcome};
use crate::model::{
    Branch, CommitId, CommitRecord, Entry, LineageCommit, Metadata, NewEntry, Repository,
};
use crate::refs::{self, RequestedCommit, ResolvedRef};
use crate::retention::{mark_expired, ExpireCursor, ExpireResult, RetentionPolicy};
use crate::revert::revert_branch;
use crate::store::MemStore;
use crate::views::{self, ListEntriesResult};
use crate::writer;

/// Requests the full result set from a paginated operation.
pub const UNBOUNDED: i64 = -1;

/// A page of results plus a truncation flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    /// The page, in the operation's canonical order.
    pub results: Vec<T>,
    /// True when more results exist past the page.
    pub has_more: bool,
}

/// Options for point reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetEntryParams {
    /// Return the entry even when retention marked it expired.
    pub return_expired: bool,
}

/// Options for listings.
#[derive(Debug, Clone)]
pub struct ListEntriesParams {
    /// List only paths under this prefix.
    pub prefix: String,
    /// Start strictly after this path (or common-prefix token).
    pub after: String,
    /// Page size; [`UNBOUNDED`] for the full set.
    pub amount: i64,
    /// Collapse paths sharing a sub-path up to this delimiter; empty for a
    /// flat listing.
    pub delimiter: String,
    /// Include rows retention has marked expired.
    pub include_expired: bool,
}

impl Default for ListEntriesParams {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            after: String::new(),
            amount: UNBOUNDED,
            delimiter: String::new(),
            include_expired: false,
        }
    }
}

/// The catalog engine.
///
/// Owns the transactional store; every public operation opens one
/// transaction, observes its cancellation token at the transaction
/// boundary, and either fully commits or leaves no trace.
#[derive(Debug, Default)]
pub struct Catalog {
    store: MemStore,
    config: CatalogConfig,
}

impl Catalog {
    /// Creates a catalog with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog with the given configuration.
    #[must_use]
    pub fn with_config(config: CatalogConfig) -> Self {
        Self {
            store: MemStore::new(config.lock_timeout()),
            config,
        }
    }

    pub(crate) fn store(&self) -> &MemStore {
        &self.store
    }

    fn amount_to_limit(&self, amount: i64) -> usize {
        if amount < 0 {
            usize::MAX
        } else {
            usize::try_from(amount)
                .unwrap_or(usize::MAX)
                .min(self.config.max_list_amount)
        }
    }

    // -----------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------

    /// Creates a repository together with its default branch.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::AlreadyExists`] on a name collision.
    pub fn create_repository(
        &self,
        cancel: &CancelToken,
        name: &RepositoryName,
        storage_namespace: &str,
        default_branch: &BranchName,
    ) -> Result<Repository> {
        let span = catalog_span("create_repository", name.as_str(), default_branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            let repository = Repository {
                name: name.clone(),
                storage_namespace: storage_namespace.to_string(),
                default_branch: default_branch.clone(),
                created_at: Utc::now(),
            };
            tx.insert_repository(repository.clone())?;
            tx.insert_branch(name.clone(), default_branch.clone(), 0, None, Vec::new())?;
            Ok(repository)
        })
    }

    /// Fetches a repository by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn get_repository(
        &self,
        cancel: &CancelToken,
        name: &RepositoryName,
    ) -> Result<Repository> {
        self.store
            .read_tx(cancel, |tables| Ok(tables.repository(name)?.clone()))
    }

    /// Lists repositories in name order, strictly after `after`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn list_repositories(
        &self,
        cancel: &CancelToken,
        after: Option<&RepositoryName>,
        amount: i64,
    ) -> Result<Paginated<Repository>> {
        let limit = self.amount_to_limit(amount);
        self.store.read_tx(cancel, |tables| {
            let mut results: Vec<Repository> = tables
                .repositories_after(after)
                .take(limit.saturating_add(1))
                .cloned()
                .collect();
            let has_more = results.len() > limit;
            results.truncate(limit);
            Ok(Paginated { results, has_more })
        })
    }

    /// Deletes a repository and everything under it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn delete_repository(&self, cancel: &CancelToken, name: &RepositoryName) -> Result<()> {
        let span = catalog_span("delete_repository", name.as_str(), "");
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            let branches: Vec<Branch> = tx.tables().branches_of(name, None).cloned().collect();
            for branch in branches {
                cascade_branch(tx, &branch)?;
            }
            tx.remove_repository(name)
        })
    }

    // -----------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------

    /// Creates a branch from any reference in the repository.
    ///
    /// The new branch's lineage is the source branch at the resolved commit,
    /// followed by the source's own lineage.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::AlreadyExists`] on a name collision and
    /// [`CatalogError::NotFound`] for a missing source.
    pub fn create_branch(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        name: &BranchName,
        source_ref: &str,
    ) -> Result<Branch> {
        let span = catalog_span("create_branch", repository.as_str(), source_ref);
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let source = refs::resolve(tx.tables(), repository, source_ref)?;
            let head_commit = refs::commit_at(tx.tables(), &source);

            let mut lineage = vec![LineageCommit {
                branch_id: source.branch_id,
                seq: source.seq,
            }];
            lineage.extend(source.lineage.iter().copied());

            tx.insert_branch(repository.clone(), name.clone(), 0, head_commit, lineage)
        })
    }

    /// Fetches a branch by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn get_branch(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        name: &BranchName,
    ) -> Result<Branch> {
        self.store.read_tx(cancel, |tables| {
            Ok(tables.branch_by_name(repository, name)?.clone())
        })
    }

    /// Lists a repository's branches in name order, strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for a missing repository.
    pub fn list_branches(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        after: Option<&BranchName>,
        amount: i64,
    ) -> Result<Paginated<Branch>> {
        let limit = self.amount_to_limit(amount);
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            let mut results: Vec<Branch> = tables
                .branches_of(repository, after)
                .take(limit.saturating_add(1))
                .cloned()
                .collect();
            let has_more = results.len() > limit;
            results.truncate(limit);
            Ok(Paginated { results, has_more })
        })
    }

    /// Deletes a branch and its rows and commits.
    ///
    /// # Errors
    ///
    /// Refuses the repository's default branch with
    /// [`CatalogError::InvalidReference`].
    pub fn delete_branch(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        name: &BranchName,
    ) -> Result<()> {
        let span = catalog_span("delete_branch", repository.as_str(), name.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            let repo = tx.tables().repository(repository)?.clone();
            if repo.default_branch == *name {
                return Err(CatalogError::InvalidReference {
                    reference: name.as_str().to_string(),
                    message: "cannot delete the default branch".to_string(),
                });
            }
            let branch = tx.tables().branch_by_name(repository, name)?.clone();
            cascade_branch(tx, &branch)
        })
    }

    // -----------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------

    /// Stages a new object version on a branch.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for a missing branch and
    /// [`CatalogError::InvalidPath`] for an empty path.
    pub fn create_entry(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        entry: NewEntry,
    ) -> Result<()> {
        let span = catalog_span("create_entry", repository.as_str(), branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            writer::create_entry(tx, &branch, entry, Utc::now())
        })
    }

    /// Reads the entry visible at a reference.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when nothing is visible and
    /// [`CatalogError::Expired`] for a marked row without
    /// `params.return_expired`.
    pub fn get_entry(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        reference: &str,
        path: &str,
        params: GetEntryParams,
    ) -> Result<Entry> {
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            let resolved = refs::resolve(tables, repository, reference)?;
            let row = views::visible_row(tables, &resolved, path)?
                .ok_or_else(|| CatalogError::not_found(format!("entry {path}")))?;
            if row.is_expired && !params.return_expired {
                return Err(CatalogError::Expired);
            }
            Ok(Entry::from(&row))
        })
    }

    /// Lists entries visible at a reference.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for missing repository or
    /// reference.
    pub fn list_entries(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        reference: &str,
        params: &ListEntriesParams,
    ) -> Result<ListEntriesResult> {
        let limit = self.amount_to_limit(params.amount);
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            let resolved = refs::resolve(tables, repository, reference)?;
            views::list_entries(
                tables,
                &resolved,
                &params.prefix,
                &params.after,
                limit,
                &params.delimiter,
                params.include_expired,
            )
        })
    }

    /// Deletes a path from a branch's uncommitted view.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when nothing is visible there.
    pub fn delete_entry(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        path: &str,
    ) -> Result<()> {
        let span = catalog_span("delete_entry", repository.as_str(), branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            writer::delete_entry(tx, &branch, path, Utc::now())
        })
    }

    /// Discards staged changes under a prefix. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidPath`] for an empty prefix.
    pub fn revert_entries(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        prefix: &str,
    ) -> Result<()> {
        let span = catalog_span("revert_entries", repository.as_str(), branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            writer::revert_entries(tx, &branch, prefix)?;
            Ok(())
        })
    }

    /// Discards the staged change for exactly one path. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidPath`] for an empty path.
    pub fn revert_object(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        path: &str,
    ) -> Result<()> {
        let span = catalog_span("revert_object", repository.as_str(), branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            writer::revert_object(tx, &branch, path)?;
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------

    /// Seals a branch's staged rows into a commit.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NothingToCommit`] when nothing is staged.
    pub fn commit(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        message: &str,
        committer: &str,
        metadata: Option<Metadata>,
    ) -> Result<CommitRecord> {
        let span = catalog_span("commit", repository.as_str(), branch.as_str());
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            commit_branch(
                tx,
                &branch,
                message,
                committer,
                metadata.unwrap_or_default(),
                None,
                Utc::now(),
            )
        })
    }

    /// Fetches a commit by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist in the
    /// repository.
    pub fn get_commit(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        id: &CommitId,
    ) -> Result<CommitRecord> {
        self.store.read_tx(cancel, |tables| {
            let commit = tables.commit(id)?;
            if commit.repository != *repository {
                return Err(CatalogError::not_found(format!(
                    "commit {id} in {repository}"
                )));
            }
            Ok(commit.clone())
        })
    }

    /// Walks a branch's history from its head (or `from`), newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for missing branch or `from`.
    pub fn log_commits(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        from: Option<&CommitId>,
        amount: i64,
    ) -> Result<CommitLogResult> {
        let limit = self.amount_to_limit(amount);
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            let branch = tables.branch_by_name(repository, branch)?;
            let start = match from {
                Some(id) => Some(id.clone()),
                None => branch.head_commit.clone(),
            };
            log_commits(tables, start.as_ref(), limit)
        })
    }

    // -----------------------------------------------------------------
    // Diff / merge / revert
    // -----------------------------------------------------------------

    /// Diffs `right_ref` against `left_ref` through their lowest common
    /// ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NoMergeBase`] when both sides have history
    /// but share none.
    pub fn diff(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        left_ref: &str,
        right_ref: &str,
    ) -> Result<Vec<Difference>> {
        let span = catalog_span("diff", repository.as_str(), left_ref);
        let _guard = span.enter();
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            let left = refs::resolve(tables, repository, left_ref)?;
            let right = refs::resolve(tables, repository, right_ref)?;

            let base = match (
                refs::commit_at(tables, &left),
                refs::commit_at(tables, &right),
            ) {
                (Some(l), Some(r)) => {
                    let Some(base) = crate::diff::merge_base(tables, &l, &r)? else {
                        return Err(CatalogError::NoMergeBase);
                    };
                    let base_branch = tables.branch(base.branch_id)?;
                    Some(ResolvedRef {
                        branch_id: base.branch_id,
                        requested: RequestedCommit::At(base.seq),
                        seq: base.seq,
                        lineage: base_branch.lineage.clone(),
                    })
                }
                _ => None,
            };
            diff_refs(tables, Some(&left), &right, base.as_ref())
        })
    }

    /// Merges `source_ref` into the branch `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MergeConflict`] carrying the conflict set
    /// when any path conflicts; no rows change in that case.
    pub fn merge(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        source_ref: &str,
        destination: &BranchName,
        committer: &str,
        message: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<MergeOutcome> {
        let span = catalog_span("merge", repository.as_str(), source_ref);
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            let repo = tx.tables().repository(repository)?.clone();
            let source = refs::resolve(tx.tables(), repository, source_ref)?;
            let destination = tx.tables().branch_by_name(repository, destination)?.clone();
            merge_into(
                tx,
                &repo,
                &source,
                &destination,
                message,
                committer,
                metadata.unwrap_or_default(),
                Utc::now(),
            )
        })
    }

    /// Resets a branch to one of its own historical commits.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidCommit`] unless `commit_ref` resolves
    /// to a specific commit of this branch.
    pub fn revert_branch(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        branch: &BranchName,
        commit_ref: &str,
    ) -> Result<()> {
        let span = catalog_span("revert_branch", repository.as_str(), commit_ref);
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            let branch = tx.tables().branch_by_name(repository, branch)?.clone();
            let target = refs::resolve(tx.tables(), repository, commit_ref)?;
            revert_branch(tx, &branch, &target)
        })
    }

    // -----------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------

    /// Stores (or clears) a repository's retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for a missing repository.
    pub fn set_retention_policy(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        policy: Option<RetentionPolicy>,
    ) -> Result<()> {
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            tx.set_retention_policy(repository.clone(), policy);
            Ok(())
        })
    }

    /// Fetches a repository's retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when none is configured.
    pub fn get_retention_policy(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
    ) -> Result<RetentionPolicy> {
        self.store.read_tx(cancel, |tables| {
            tables.repository(repository)?;
            tables
                .retention_policy(repository)
                .cloned()
                .ok_or_else(|| {
                    CatalogError::not_found(format!("retention policy for {repository}"))
                })
        })
    }

    /// Streams the rows `policy` expires, lazily.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for a missing repository.
    pub fn query_expired(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        policy: &RetentionPolicy,
    ) -> Result<ExpireCursor<'_>> {
        ExpireCursor::new(
            &self.store,
            cancel,
            repository.clone(),
            policy.clone(),
            self.config.retention_batch_size,
        )
    }

    /// Marks scanned rows expired, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if a referenced row vanished;
    /// nothing is marked in that case.
    pub fn mark_expired(
        &self,
        cancel: &CancelToken,
        repository: &RepositoryName,
        results: &[ExpireResult],
    ) -> Result<()> {
        let span = catalog_span("mark_expired", repository.as_str(), "");
        let _guard = span.enter();
        self.store.write_tx(cancel, |tx| {
            tx.tables().repository(repository)?;
            mark_expired(tx, repository, results)
        })
    }
}

/// Removes a branch with its rows and commit records.
fn cascade_branch(tx: &mut crate::store::Tx<'_>, branch: &Branch) -> Result<()> {
    tx.remove_entries_of_branch(branch.id);
    for seq in tx.tables().commit_seqs_above(branch.id, 0) {
        let id = tx
            .tables()
            .commit_by_seq(branch.id, seq)
            .map(|c| c.id.clone())
            .ok_or_else(|| CatalogError::internal("commit index out of sync"))?;
        tx.remove_commit(&id)?;
    }
    tx.remove_branch(branch.id)
}
