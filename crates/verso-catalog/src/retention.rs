//! The retention engine: policy-driven expiration of historical versions.
//!
//! `query_expired` streams rows that qualify under a policy; it never
//! materializes the result set. The cursor walks branch by branch, path by
//! path, fetching a bounded batch per read transaction and resuming from the
//! last row key, so inventories of tens of millions of rows stream in
//! constant memory. `mark_expired` then flags the returned rows; marked rows
//! are withheld from reads unless the caller opts in.
//!
//! Physical deletion is not the catalog's business: external collectors
//! reclaim the blobs of marked rows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use verso_core::{BranchName, CancelToken, RepositoryName};

use crate::error::{CatalogError, Result};
use crate::model::{BranchId, CommitSeq, EntryRow, InternalObjectRef};
use crate::store::{MemStore, Tables, Tx};

/// Hours, as used by expiration clauses.
pub type TimePeriodHours = i64;

/// When rows matching a rule's filter expire.
///
/// Clauses are independent; any satisfied clause expires the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleExpiration {
    /// Expire every row older than this many hours.
    pub all: Option<TimePeriodHours>,
    /// Expire superseded rows (`max_commit` below the sentinel) older than
    /// this many hours.
    pub noncurrent: Option<TimePeriodHours>,
    /// Expire uncommitted rows older than this many hours.
    pub uncommitted: Option<TimePeriodHours>,
}

/// One retention rule: a branch-qualified path filter plus expirations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    /// Disabled rules are kept but never match.
    pub enabled: bool,
    /// Prefix over `{branch}/{path}`; empty matches everything.
    pub filter_prefix: String,
    /// When matching rows expire.
    pub expiration: RuleExpiration,
}

/// A repository's retention policy. Rules are OR-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// The policy's rules.
    pub rules: Vec<RetentionRule>,
}

/// One expirable row, as streamed by [`ExpireCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpireResult {
    /// Owning repository.
    pub repository: RepositoryName,
    /// Branch the row lives on.
    pub branch: BranchName,
    /// The row's path.
    pub path: String,
    /// The blob the external collector may reclaim.
    pub physical_address: String,
    /// Opaque row address consumed by [`mark_expired`].
    pub internal_reference: String,
}

fn age_at_least(now: DateTime<Utc>, created: DateTime<Utc>, hours: TimePeriodHours) -> bool {
    now - created >= Duration::hours(hours)
}

/// Whether `row` qualifies for expiration under `policy`.
///
/// Tombstones and sealed deletion markers carry no reclaimable payload and
/// never qualify; neither do rows already marked.
fn qualifies(
    row: &EntryRow,
    branch_name: &BranchName,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> bool {
    if row.is_expired || row.is_tombstone() || row.is_negative() {
        return false;
    }
    let qualified_path = format!("{}/{}", branch_name, row.path);
    policy.rules.iter().any(|rule| {
        if !rule.enabled || !qualified_path.starts_with(&rule.filter_prefix) {
            return false;
        }
        let e = &rule.expiration;
        if e.all
            .is_some_and(|hours| age_at_least(now, row.creation_date, hours))
        {
            return true;
        }
        if e.noncurrent.is_some_and(|hours| {
            !row.is_current() && age_at_least(now, row.creation_date, hours)
        }) {
            return true;
        }
        e.uncommitted.is_some_and(|hours| {
            row.is_uncommitted() && age_at_least(now, row.creation_date, hours)
        })
    })
}

/// Whether every other live row sharing the physical address also
/// qualifies. An address some branch still needs is never flagged.
fn address_fully_covered(
    tables: &Tables,
    branches: &[(BranchId, BranchName)],
    branch_ids: &[BranchId],
    row: &EntryRow,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> bool {
    tables
        .rows_with_address(branch_ids, &row.physical_address)
        .into_iter()
        .filter(|other| {
            !(other.branch_id == row.branch_id
                && other.path == row.path
                && other.min_commit == row.min_commit)
        })
        .filter(|other| !other.is_expired && !other.is_tombstone() && !other.is_negative())
        .all(|other| {
            branches
                .iter()
                .find(|(id, _)| *id == other.branch_id)
                .is_some_and(|(_, name)| qualifies(other, name, policy, now))
        })
}

/// Lazy cursor over the rows a policy expires.
///
/// Yields `Err` once and stops on cancellation or store timeout; the caller
/// may build a fresh cursor to resume (already-marked rows never re-qualify,
/// so resumption is idempotent).
pub struct ExpireCursor<'a> {
    store: &'a MemStore,
    repository: RepositoryName,
    policy: RetentionPolicy,
    cancel: CancelToken,
    now: DateTime<Utc>,
    branches: Vec<(BranchId, BranchName)>,
    branch_ids: Vec<BranchId>,
    branch_idx: usize,
    position: Option<(String, CommitSeq)>,
    batch: VecDeque<ExpireResult>,
    batch_size: usize,
    finished: bool,
}

impl<'a> ExpireCursor<'a> {
    pub(crate) fn new(
        store: &'a MemStore,
        cancel: &CancelToken,
        repository: RepositoryName,
        policy: RetentionPolicy,
        batch_size: usize,
    ) -> Result<Self> {
        let branches = store.read_tx(cancel, |tables| {
            tables.repository(&repository)?;
            Ok(tables
                .branches_of(&repository, None)
                .map(|b| (b.id, b.name.clone()))
                .collect::<Vec<_>>())
        })?;
        let branch_ids = branches.iter().map(|(id, _)| *id).collect();
        let enabled = policy.rules.iter().any(|r| r.enabled);
        Ok(Self {
            store,
            repository,
            policy,
            cancel: cancel.clone(),
            now: Utc::now(),
            branches,
            branch_ids,
            branch_idx: 0,
            position: None,
            batch: VecDeque::new(),
            batch_size: batch_size.max(1),
            finished: !enabled,
        })
    }

    /// Scans forward until the batch holds results or the tables are
    /// exhausted. Work per read transaction is bounded by `batch_size`
    /// scanned rows, not emitted ones.
    fn fill_batch(&mut self) -> Result<()> {
        while self.batch.is_empty() && self.branch_idx < self.branches.len() {
            self.cancel.check()?;
            let (branch_id, branch_name) = self.branches[self.branch_idx].clone();
            let position = self.position.take();
            let mut scanned = 0usize;
            let mut results = Vec::new();
            let mut next_position = None;

            self.store.read_tx(&self.cancel, |tables| {
                for row in tables.rows_of_branch_after(branch_id, position.as_ref()) {
                    scanned += 1;
                    next_position = Some((row.path.clone(), row.min_commit));
                    if qualifies(row, &branch_name, &self.policy, self.now)
                        && address_fully_covered(
                            tables,
                            &self.branches,
                            &self.branch_ids,
                            row,
                            &self.policy,
                            self.now,
                        )
                    {
                        results.push(ExpireResult {
                            repository: self.repository.clone(),
                            branch: branch_name.clone(),
                            path: row.path.clone(),
                            physical_address: row.physical_address.clone(),
                            internal_reference: InternalObjectRef {
                                branch_id: row.branch_id,
                                min_commit: row.min_commit,
                                path: row.path.clone(),
                            }
                            .to_string(),
                        });
                    }
                    if scanned >= self.batch_size {
                        break;
                    }
                }
                Ok(())
            })?;

            self.batch.extend(results);
            if scanned < self.batch_size {
                // Branch exhausted.
                self.branch_idx += 1;
                self.position = None;
            } else {
                self.position = next_position;
            }
        }
        Ok(())
    }
}

impl Iterator for ExpireCursor<'_> {
    type Item = Result<ExpireResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.batch.is_empty() {
            if let Err(err) = self.fill_batch() {
                self.finished = true;
                return Some(Err(err));
            }
        }
        match self.batch.pop_front() {
            Some(result) => Some(Ok(result)),
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Marks the rows behind `results` expired, atomically.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] if a referenced row vanished; the
/// whole transaction rolls back in that case.
pub fn mark_expired(
    tx: &mut Tx<'_>,
    repository: &RepositoryName,
    results: &[ExpireResult],
) -> Result<()> {
    for result in results {
        let reference: InternalObjectRef = result.internal_reference.parse()?;
        let branch = tx.tables().branch(reference.branch_id)?;
        if branch.repository != *repository {
            return Err(CatalogError::not_found(format!(
                "entry {} in repository {repository}",
                result.path
            )));
        }
        let key = (reference.branch_id, reference.path, reference.min_commit);
        tx.update_entry(&key, |row| row.is_expired = true)?;
    }
    Ok(())
}
