//! The commit engine: sealing staged rows into immutable commits, and the
//! commit log.
//!
//! Sealing assigns the branch's next sequence number to every staged entry
//! row and collapses tombstones into range narrowing on the rows they
//! shadow. A tombstone whose path exists only through lineage becomes a
//! sealed deletion marker: a row with the empty range `[seq, seq - 1]`,
//! invisible everywhere but suppressing lineage from `seq` onward.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use verso_core::to_canonical_bytes;

use crate::error::{CatalogError, Result};
use crate::model::{Branch, CommitId, CommitRecord, CommitSeq, Metadata};
use crate::store::{key_of, Tables, Tx};

#[derive(Serialize)]
struct ChangeDigest<'a> {
    path: &'a str,
    address: Option<&'a str>,
    checksum: Option<&'a str>,
}

#[derive(Serialize)]
struct CommitHashInput<'a> {
    repository: &'a str,
    branch: &'a str,
    seq: CommitSeq,
    parents: Vec<&'a str>,
    message: &'a str,
    committer: &'a str,
    timestamp_ms: i64,
    metadata: &'a Metadata,
    changes: Vec<ChangeDigest<'a>>,
}

/// Seals the branch's staged rows into a commit.
///
/// `extra_parent` carries the source head for merge commits; the sealed
/// commit's parents are then `[destination_head, source_head]`.
///
/// # Errors
///
/// Returns [`CatalogError::NothingToCommit`] when the staging area is empty.
pub fn commit_branch(
    tx: &mut Tx<'_>,
    branch: &Branch,
    message: &str,
    committer: &str,
    metadata: Metadata,
    extra_parent: Option<CommitId>,
    now: DateTime<Utc>,
) -> Result<CommitRecord> {
    let staged: Vec<_> = tx
        .tables()
        .rows_of_branch(branch.id)
        .filter(|row| row.is_uncommitted())
        .cloned()
        .collect();
    if staged.is_empty() {
        return Err(CatalogError::NothingToCommit);
    }

    let seq = branch.head_seq + 1;
    for row in &staged {
        let key = key_of(row);
        if row.is_tombstone() {
            // Narrow the shadowed own-branch row if one is still visible at
            // the head; a lineage-only deletion becomes a sealed marker.
            let shadowed = tx
                .tables()
                .committed_candidate(branch.id, &row.path, CommitSeq::MAX)
                .filter(|cand| cand.max_commit >= branch.head_seq && !cand.is_negative())
                .map(key_of);
            let removed = tx.remove_entry(&key)?;
            match shadowed {
                Some(shadowed_key) => {
                    tx.update_entry(&shadowed_key, |r| r.max_commit = seq - 1)?;
                }
                None => {
                    let mut marker = removed;
                    marker.min_commit = seq;
                    marker.max_commit = seq - 1;
                    put_sealed(tx, marker)?;
                }
            }
        } else {
            let mut sealed = tx.remove_entry(&key)?;
            sealed.min_commit = seq;
            put_sealed(tx, sealed)?;
        }
    }

    let mut parents: Vec<CommitId> = Vec::new();
    if let Some(head) = &branch.head_commit {
        parents.push(head.clone());
    }
    if let Some(extra) = extra_parent {
        parents.push(extra);
    }

    let changes: Vec<ChangeDigest<'_>> = staged
        .iter()
        .map(|row| ChangeDigest {
            path: &row.path,
            address: (!row.is_tombstone()).then_some(row.physical_address.as_str()),
            checksum: (!row.is_tombstone()).then_some(row.checksum.as_str()),
        })
        .collect();
    let input = CommitHashInput {
        repository: branch.repository.as_str(),
        branch: branch.name.as_str(),
        seq,
        parents: parents.iter().map(CommitId::as_str).collect(),
        message,
        committer,
        timestamp_ms: now.timestamp_millis(),
        metadata: &metadata,
        changes,
    };
    let id = CommitId::from_digest(hex::encode(Sha256::digest(to_canonical_bytes(&input)?)));

    let record = CommitRecord {
        id: id.clone(),
        repository: branch.repository.clone(),
        branch_id: branch.id,
        seq,
        parents,
        message: message.to_string(),
        committer: committer.to_string(),
        creation_date: now,
        metadata,
    };
    tx.insert_commit(record.clone())?;

    let mut advanced = branch.clone();
    advanced.head_seq = seq;
    advanced.head_commit = Some(id);
    tx.update_branch(advanced)?;

    tracing::info!(
        repository = %branch.repository,
        branch = %branch.name,
        seq,
        commit = %record.id,
        rows = staged.len(),
        "sealed commit"
    );
    Ok(record)
}

/// Inserts a freshly sealed row, displacing a row hidden by an earlier
/// branch revert if one still occupies the `(path, seq)` slot.
fn put_sealed(tx: &mut Tx<'_>, row: crate::model::EntryRow) -> Result<()> {
    let key = key_of(&row);
    if tx.tables().entry(&key).is_some() {
        tx.remove_entry(&key)?;
    }
    tx.insert_entry(row)
}

/// A page of the commit log.
#[derive(Debug, Clone)]
pub struct CommitLogResult {
    /// Commits in reverse chronological order.
    pub commits: Vec<CommitRecord>,
    /// True when the log was truncated at the requested limit.
    pub has_more: bool,
}

struct LogKey(CommitRecord);

impl PartialEq for LogKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for LogKey {}

impl Ord for LogKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.creation_date, self.0.seq, &self.0.id).cmp(&(
            other.0.creation_date,
            other.0.seq,
            &other.0.id,
        ))
    }
}

impl PartialOrd for LogKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Walks the parent DAG from `start`, newest first, fanning out through
/// both parents of merge commits. Parents pruned by branch deletion are
/// skipped.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] if `start` itself does not exist.
pub fn log_commits(
    tables: &Tables,
    start: Option<&CommitId>,
    limit: usize,
) -> Result<CommitLogResult> {
    let mut commits = Vec::new();
    let mut heap: BinaryHeap<LogKey> = BinaryHeap::new();
    let mut visited: HashSet<CommitId> = HashSet::new();

    if let Some(id) = start {
        let commit = tables.commit(id)?;
        visited.insert(commit.id.clone());
        heap.push(LogKey(commit.clone()));
    }

    let target = limit.saturating_add(1);
    let mut has_more = false;
    while let Some(LogKey(commit)) = heap.pop() {
        for parent in &commit.parents {
            if visited.insert(parent.clone()) {
                if let Ok(record) = tables.commit(parent) {
                    heap.push(LogKey(record.clone()));
                }
            }
        }
        commits.push(commit);
        if commits.len() == target {
            has_more = true;
            commits.pop();
            break;
        }
    }

    Ok(CommitLogResult { commits, has_more })
}
