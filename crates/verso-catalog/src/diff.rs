//! Three-way diff with conflict classification.
//!
//! `diff_refs` compares two references through a base (normally their lowest
//! common ancestor) and reports, path by path, how the right side differs.
//! Paths where both sides hold the same physical object with equal deletion
//! status are filtered out first; a path both sides changed since the base —
//! and ended up disagreeing on — is a conflict.
//!
//! The report is directional: changes present only on the left are the
//! mirror call's business. Merge consumes `diff(lca, source)`, where the
//! left side never differs from the base and every difference is a change
//! the source made.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeSet, HashSet};

use crate::error::Result;
use crate::model::{CommitId, CommitRecord, EntryRow};
use crate::refs::ResolvedRef;
use crate::store::Tables;
use crate::views::visible_row;

/// How a path differs between two references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    /// Present on the right, absent from the base and the left.
    Added,
    /// Present at the base, removed on the right.
    Removed,
    /// Present on both sides with different content.
    Changed,
    /// Both sides changed the path since the base and disagree.
    Conflict,
}

/// One path's difference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Difference {
    /// The classification.
    pub kind: DifferenceKind,
    /// The path that differs.
    pub path: String,
}

/// One conflicting path, carried by the merge-conflict error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Conflict {
    /// The path both sides changed incompatibly.
    pub path: String,
}

/// True when two optional rows hold the same physical object with equal
/// deletion status.
#[must_use]
pub(crate) fn same_object(a: Option<&EntryRow>, b: Option<&EntryRow>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.physical_address == b.physical_address && a.checksum == b.checksum,
        _ => false,
    }
}

fn visible_opt(
    tables: &Tables,
    resolved: Option<&ResolvedRef>,
    path: &str,
) -> Result<Option<EntryRow>> {
    match resolved {
        Some(r) => visible_row(tables, r, path),
        None => Ok(None),
    }
}

/// Every path either side (or the base) could possibly surface.
fn candidate_paths(tables: &Tables, refs: &[Option<&ResolvedRef>]) -> BTreeSet<String> {
    let mut branches = BTreeSet::new();
    for resolved in refs.iter().copied().flatten() {
        branches.insert(resolved.branch_id);
        branches.extend(resolved.lineage.iter().map(|lc| lc.branch_id));
    }
    let mut paths = BTreeSet::new();
    for branch in branches {
        paths.extend(tables.rows_of_branch(branch).map(|row| row.path.clone()));
    }
    paths
}

/// Diffs `right` against `left` through `base`. `None` stands for the empty
/// tree (no common ancestor with content).
///
/// # Errors
///
/// Propagates visibility-resolution failures.
pub fn diff_refs(
    tables: &Tables,
    left: Option<&ResolvedRef>,
    right: &ResolvedRef,
    base: Option<&ResolvedRef>,
) -> Result<Vec<Difference>> {
    let mut differences = Vec::new();
    for path in candidate_paths(tables, &[left, Some(right), base]) {
        let l = visible_opt(tables, left, &path)?;
        let r = visible_row(tables, right, &path)?;
        if same_object(l.as_ref(), r.as_ref()) {
            continue;
        }
        let a = visible_opt(tables, base, &path)?;

        let left_changed = !same_object(l.as_ref(), a.as_ref());
        let right_changed = !same_object(r.as_ref(), a.as_ref());

        let kind = if left_changed && right_changed {
            DifferenceKind::Conflict
        } else if right_changed {
            if r.is_none() {
                DifferenceKind::Removed
            } else if a.is_none() {
                DifferenceKind::Added
            } else {
                DifferenceKind::Changed
            }
        } else {
            continue;
        };
        differences.push(Difference { kind, path });
    }
    Ok(differences)
}

struct AncestorKey(CommitRecord);

impl PartialEq for AncestorKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for AncestorKey {}

impl Ord for AncestorKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.creation_date, self.0.seq, &self.0.id).cmp(&(
            other.0.creation_date,
            other.0.seq,
            &other.0.id,
        ))
    }
}

impl PartialOrd for AncestorKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Finds the lowest common ancestor of two commits by BFS over the parent
/// DAG, preferring the newest shared commit.
///
/// # Errors
///
/// Propagates commit-lookup failures for the two starting points.
pub fn merge_base(
    tables: &Tables,
    a: &CommitId,
    b: &CommitId,
) -> Result<Option<CommitRecord>> {
    let mut seen_a: HashSet<CommitId> = HashSet::new();
    let mut queue = vec![tables.commit(a)?.clone()];
    while let Some(commit) = queue.pop() {
        if !seen_a.insert(commit.id.clone()) {
            continue;
        }
        for parent in &commit.parents {
            if let Ok(record) = tables.commit(parent) {
                queue.push(record.clone());
            }
        }
    }

    let mut heap = BinaryHeap::new();
    let mut visited: HashSet<CommitId> = HashSet::new();
    let start = tables.commit(b)?.clone();
    visited.insert(start.id.clone());
    heap.push(AncestorKey(start));
    while let Some(AncestorKey(commit)) = heap.pop() {
        if seen_a.contains(&commit.id) {
            return Ok(Some(commit));
        }
        for parent in &commit.parents {
            if visited.insert(parent.clone()) {
                if let Ok(record) = tables.commit(parent) {
                    heap.push(AncestorKey(record.clone()));
                }
            }
        }
    }
    Ok(None)
}
