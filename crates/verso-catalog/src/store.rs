//! The transactional store backing the catalog.
//!
//! Every public catalog operation runs inside exactly one transaction.
//! `MemStore` keeps the relational-style tables in memory behind a single
//! reader-writer lock: read-only transactions share the lock, write
//! transactions hold it exclusively, so serializable isolation holds by
//! construction. Lock acquisition has a deadline; expiry surfaces as
//! [`CatalogError::Timeout`].
//!
//! Write transactions mutate the tables through typed accessors on [`Tx`]
//! only. Every mutation pushes an inverse onto an undo log; any error (or a
//! cancellation observed before commit) replays the log backwards, so the
//! caller sees all-or-nothing semantics. A relational backend would replace
//! this module wholesale and may report serialization failures as
//! [`CatalogError::Conflict`]; callers are expected to retry those.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::Duration;

use verso_core::{BranchName, CancelToken, RepositoryName};

use crate::error::{CatalogError, Result};
use crate::model::{
    Branch, BranchId, CommitId, CommitRecord, CommitSeq, EntryRow, Repository, UNCOMMITTED,
};
use crate::retention::RetentionPolicy;

/// Primary key of an entry row: `(branch, path, min_commit)`.
///
/// `min_commit` participates so an uncommitted row (`min_commit == 0`) and
/// the committed history of the same path coexist; the map doubles as the
/// `(branch_id, path, min_commit)` index entry queries rely on.
pub type EntryKey = (BranchId, String, CommitSeq);

/// Returns the primary key of a row.
#[must_use]
pub fn key_of(row: &EntryRow) -> EntryKey {
    (row.branch_id, row.path.clone(), row.min_commit)
}

/// The relational-style tables.
#[derive(Debug, Default)]
pub struct Tables {
    repositories: BTreeMap<RepositoryName, Repository>,
    branches: HashMap<BranchId, Branch>,
    branch_names: BTreeMap<RepositoryName, BTreeMap<BranchName, BranchId>>,
    commits: HashMap<CommitId, CommitRecord>,
    commit_seqs: BTreeMap<(BranchId, CommitSeq), CommitId>,
    entries: BTreeMap<EntryKey, EntryRow>,
    retention_policies: BTreeMap<RepositoryName, RetentionPolicy>,
    next_branch_id: u64,
}

impl Tables {
    /// Looks up a repository by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn repository(&self, name: &RepositoryName) -> Result<&Repository> {
        self.repositories
            .get(name)
            .ok_or_else(|| CatalogError::not_found(format!("repository {name}")))
    }

    /// Iterates repositories in name order, strictly after `after`.
    pub fn repositories_after<'a>(
        &'a self,
        after: Option<&RepositoryName>,
    ) -> impl Iterator<Item = &'a Repository> + 'a {
        let lower = match after {
            Some(name) => Bound::Excluded(name.clone()),
            None => Bound::Unbounded,
        };
        self.repositories
            .range((lower, Bound::Unbounded))
            .map(|(_, repo)| repo)
    }

    /// Looks up a branch by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn branch(&self, id: BranchId) -> Result<&Branch> {
        self.branches
            .get(&id)
            .ok_or_else(|| CatalogError::not_found(format!("branch #{id}")))
    }

    /// Looks up a branch by repository and name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn branch_by_name(&self, repo: &RepositoryName, name: &BranchName) -> Result<&Branch> {
        let id = self
            .branch_names
            .get(repo)
            .and_then(|names| names.get(name))
            .ok_or_else(|| CatalogError::not_found(format!("branch {repo}/{name}")))?;
        self.branch(*id)
    }

    /// Iterates a repository's branches in name order, strictly after `after`.
    pub fn branches_of<'a>(
        &'a self,
        repo: &RepositoryName,
        after: Option<&BranchName>,
    ) -> impl Iterator<Item = &'a Branch> + 'a {
        let lower = match after {
            Some(name) => Bound::Excluded(name.clone()),
            None => Bound::Unbounded,
        };
        self.branch_names
            .get(repo)
            .into_iter()
            .flat_map(move |names| names.range((lower.clone(), Bound::Unbounded)))
            .filter_map(|(_, id)| self.branches.get(id))
    }

    /// Looks up a commit by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn commit(&self, id: &CommitId) -> Result<&CommitRecord> {
        self.commits
            .get(id)
            .ok_or_else(|| CatalogError::not_found(format!("commit {id}")))
    }

    /// Looks up a commit by its branch and sequence number.
    #[must_use]
    pub fn commit_by_seq(&self, branch: BranchId, seq: CommitSeq) -> Option<&CommitRecord> {
        let id = self.commit_seqs.get(&(branch, seq))?;
        self.commits.get(id)
    }

    /// Sequence numbers of a branch's own commits strictly above `floor`.
    #[must_use]
    pub fn commit_seqs_above(&self, branch: BranchId, floor: CommitSeq) -> Vec<CommitSeq> {
        self.commit_seqs
            .range((
                Bound::Excluded((branch, floor)),
                Bound::Included((branch, CommitSeq::MAX)),
            ))
            .map(|((_, seq), _)| *seq)
            .collect()
    }

    /// The uncommitted row (entry or tombstone) staged for a path, if any.
    #[must_use]
    pub fn uncommitted_row(&self, branch: BranchId, path: &str) -> Option<&EntryRow> {
        self.entries
            .get(&(branch, path.to_string(), UNCOMMITTED))
    }

    /// The latest committed row for a path as of commit `seq`: the row with
    /// the greatest `min_commit` in `[1, seq]`. The caller inspects its
    /// `max_commit` to tell a live version from a sealed deletion.
    #[must_use]
    pub fn committed_candidate(
        &self,
        branch: BranchId,
        path: &str,
        seq: CommitSeq,
    ) -> Option<&EntryRow> {
        if seq == 0 {
            return None;
        }
        self.entries
            .range((
                Bound::Included((branch, path.to_string(), 1)),
                Bound::Included((branch, path.to_string(), seq)),
            ))
            .next_back()
            .map(|(_, row)| row)
    }

    /// The branch's current committed row for a path (`max_commit` still the
    /// sentinel), if any.
    #[must_use]
    pub fn current_committed(&self, branch: BranchId, path: &str) -> Option<&EntryRow> {
        self.committed_candidate(branch, path, CommitSeq::MAX)
            .filter(|row| row.is_current())
    }

    /// First path on the branch strictly greater than `lower`.
    #[must_use]
    pub fn next_path_after(&self, branch: BranchId, lower: &str) -> Option<&str> {
        self.entries
            .range((
                Bound::Excluded((branch, lower.to_string(), CommitSeq::MAX)),
                Bound::Unbounded,
            ))
            .next()
            .filter(|((b, _, _), _)| *b == branch)
            .map(|((_, path, _), _)| path.as_str())
    }

    /// All rows of a branch, ordered by `(path, min_commit)`.
    pub fn rows_of_branch(&self, branch: BranchId) -> impl Iterator<Item = &EntryRow> + '_ {
        self.entries
            .range((
                Bound::Included((branch, String::new(), 0)),
                Bound::Unbounded,
            ))
            .take_while(move |((b, _, _), _)| *b == branch)
            .map(|(_, row)| row)
    }

    /// Rows of a branch starting strictly after `(path, min_commit)`,
    /// ordered; used by streaming cursors to resume.
    pub fn rows_of_branch_after(
        &self,
        branch: BranchId,
        position: Option<&(String, CommitSeq)>,
    ) -> impl Iterator<Item = &EntryRow> + '_ {
        let lower = match position {
            Some((path, min)) => Bound::Excluded((branch, path.clone(), *min)),
            None => Bound::Included((branch, String::new(), 0)),
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .take_while(move |((b, _, _), _)| *b == branch)
            .map(|(_, row)| row)
    }

    /// All rows across `branches` whose physical address equals `address`.
    #[must_use]
    pub fn rows_with_address(&self, branches: &[BranchId], address: &str) -> Vec<&EntryRow> {
        branches
            .iter()
            .flat_map(|b| self.rows_of_branch(*b))
            .filter(|row| row.physical_address == address)
            .collect()
    }

    /// Fetches a row by primary key.
    #[must_use]
    pub fn entry(&self, key: &EntryKey) -> Option<&EntryRow> {
        self.entries.get(key)
    }

    /// The retention policy configured for a repository, if any.
    #[must_use]
    pub fn retention_policy(&self, repo: &RepositoryName) -> Option<&RetentionPolicy> {
        self.retention_policies.get(repo)
    }
}

enum Undo {
    RepositoryInserted(RepositoryName),
    RepositoryRemoved(Repository),
    BranchInserted(BranchId),
    BranchReplaced(Branch),
    BranchRemoved(Branch),
    CommitInserted(CommitId, BranchId, CommitSeq),
    CommitRemoved(CommitRecord),
    EntryInserted(EntryKey),
    EntryReplaced(EntryRow),
    EntryRemoved(EntryRow),
    PolicyReplaced(RepositoryName, Option<RetentionPolicy>),
    BranchIdCounter(u64),
}

/// A write transaction: typed, undo-logged access to the tables.
pub struct Tx<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
}

impl<'a> Tx<'a> {
    /// Read access to the tables within the transaction. Reads observe the
    /// transaction's own writes.
    #[must_use]
    pub fn tables(&self) -> &Tables {
        self.tables
    }

    /// Inserts a repository.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::AlreadyExists`] on a name collision.
    pub fn insert_repository(&mut self, repo: Repository) -> Result<()> {
        if self.tables.repositories.contains_key(&repo.name) {
            return Err(CatalogError::already_exists(format!(
                "repository {}",
                repo.name
            )));
        }
        self.undo.push(Undo::RepositoryInserted(repo.name.clone()));
        self.tables.repositories.insert(repo.name.clone(), repo);
        Ok(())
    }

    /// Removes a repository row. The caller cascades branches first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn remove_repository(&mut self, name: &RepositoryName) -> Result<()> {
        let repo = self
            .tables
            .repositories
            .remove(name)
            .ok_or_else(|| CatalogError::not_found(format!("repository {name}")))?;
        self.undo.push(Undo::RepositoryRemoved(repo));
        if let Some(policy) = self.tables.retention_policies.remove(name) {
            self.undo
                .push(Undo::PolicyReplaced(name.clone(), Some(policy)));
        }
        Ok(())
    }

    /// Inserts a branch, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::AlreadyExists`] on a `(repository, name)`
    /// collision.
    pub fn insert_branch(
        &mut self,
        repository: RepositoryName,
        name: BranchName,
        head_seq: CommitSeq,
        head_commit: Option<CommitId>,
        lineage: Vec<crate::model::LineageCommit>,
    ) -> Result<Branch> {
        if self
            .tables
            .branch_names
            .get(&repository)
            .is_some_and(|names| names.contains_key(&name))
        {
            return Err(CatalogError::already_exists(format!(
                "branch {repository}/{name}"
            )));
        }
        let prev_counter = self.tables.next_branch_id;
        self.undo.push(Undo::BranchIdCounter(prev_counter));
        self.tables.next_branch_id += 1;
        let id = BranchId(self.tables.next_branch_id);

        let branch = Branch {
            id,
            repository,
            name,
            head_seq,
            head_commit,
            lineage,
        };
        self.undo.push(Undo::BranchInserted(id));
        self.tables
            .branch_names
            .entry(branch.repository.clone())
            .or_default()
            .insert(branch.name.clone(), id);
        self.tables.branches.insert(id, branch.clone());
        Ok(branch)
    }

    /// Replaces a branch row (head advancement, revert).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] if the branch does not exist; the
    /// caller always holds a freshly read branch.
    pub fn update_branch(&mut self, branch: Branch) -> Result<()> {
        let prev = self
            .tables
            .branches
            .insert(branch.id, branch)
            .ok_or_else(|| CatalogError::internal("update of a branch that does not exist"))?;
        self.undo.push(Undo::BranchReplaced(prev));
        Ok(())
    }

    /// Removes a branch row. The caller removes its entries and commits.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn remove_branch(&mut self, id: BranchId) -> Result<()> {
        let branch = self
            .tables
            .branches
            .remove(&id)
            .ok_or_else(|| CatalogError::not_found(format!("branch #{id}")))?;
        if let Some(names) = self.tables.branch_names.get_mut(&branch.repository) {
            names.remove(&branch.name);
        }
        self.undo.push(Undo::BranchRemoved(branch));
        Ok(())
    }

    /// Inserts a commit record.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] on an id or sequence collision;
    /// both indicate engine bugs rather than user input.
    pub fn insert_commit(&mut self, commit: CommitRecord) -> Result<()> {
        if self.tables.commits.contains_key(&commit.id) {
            return Err(CatalogError::internal(format!(
                "commit id collision for {}",
                commit.id
            )));
        }
        let seq_key = (commit.branch_id, commit.seq);
        if self.tables.commit_seqs.contains_key(&seq_key) {
            return Err(CatalogError::internal(format!(
                "commit sequence collision at {}@{}",
                commit.branch_id, commit.seq
            )));
        }
        self.undo.push(Undo::CommitInserted(
            commit.id.clone(),
            commit.branch_id,
            commit.seq,
        ));
        self.tables.commit_seqs.insert(seq_key, commit.id.clone());
        self.tables.commits.insert(commit.id.clone(), commit);
        Ok(())
    }

    /// Removes a commit record (branch revert, branch cascade).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if it does not exist.
    pub fn remove_commit(&mut self, id: &CommitId) -> Result<()> {
        let commit = self
            .tables
            .commits
            .remove(id)
            .ok_or_else(|| CatalogError::not_found(format!("commit {id}")))?;
        self.tables
            .commit_seqs
            .remove(&(commit.branch_id, commit.seq));
        self.undo.push(Undo::CommitRemoved(commit));
        Ok(())
    }

    /// Inserts an entry row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] if a row with the same key exists.
    pub fn insert_entry(&mut self, row: EntryRow) -> Result<()> {
        let key = key_of(&row);
        if self.tables.entries.contains_key(&key) {
            return Err(CatalogError::internal(format!(
                "entry row already present at {}:{}@{}",
                key.0, key.1, key.2
            )));
        }
        self.undo.push(Undo::EntryInserted(key.clone()));
        self.tables.entries.insert(key, row);
        Ok(())
    }

    /// Overwrites an existing row in place. The key must not change.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Internal`] if the row is missing or the
    /// replacement would move it.
    pub fn replace_entry(&mut self, row: EntryRow) -> Result<()> {
        let key = key_of(&row);
        let prev = self
            .tables
            .entries
            .insert(key, row)
            .ok_or_else(|| CatalogError::internal("replacement of a row that does not exist"))?;
        self.undo.push(Undo::EntryReplaced(prev));
        Ok(())
    }

    /// Mutates a row in place. The closure must not touch key fields
    /// (`branch_id`, `path`, `min_commit`); re-keying is remove + insert.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the row is missing.
    pub fn update_entry(
        &mut self,
        key: &EntryKey,
        f: impl FnOnce(&mut EntryRow),
    ) -> Result<()> {
        let row = self
            .tables
            .entries
            .get_mut(key)
            .ok_or_else(|| CatalogError::not_found(format!("entry row {}@{}", key.1, key.2)))?;
        let prev = row.clone();
        f(row);
        debug_assert_eq!(key_of(row), *key, "update_entry must not re-key the row");
        self.undo.push(Undo::EntryReplaced(prev));
        Ok(())
    }

    /// Removes an entry row and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the row is missing.
    pub fn remove_entry(&mut self, key: &EntryKey) -> Result<EntryRow> {
        let row = self
            .tables
            .entries
            .remove(key)
            .ok_or_else(|| CatalogError::not_found(format!("entry row {}@{}", key.1, key.2)))?;
        self.undo.push(Undo::EntryRemoved(row.clone()));
        Ok(row)
    }

    /// Removes every row of a branch. Used by branch cascade.
    pub fn remove_entries_of_branch(&mut self, branch: BranchId) {
        let keys: Vec<EntryKey> = self
            .tables
            .rows_of_branch(branch)
            .map(key_of)
            .collect();
        for key in keys {
            if let Some(row) = self.tables.entries.remove(&key) {
                self.undo.push(Undo::EntryRemoved(row));
            }
        }
    }

    /// Sets (or clears) the retention policy of a repository.
    pub fn set_retention_policy(
        &mut self,
        repo: RepositoryName,
        policy: Option<RetentionPolicy>,
    ) {
        let prev = match policy {
            Some(policy) => self.tables.retention_policies.insert(repo.clone(), policy),
            None => self.tables.retention_policies.remove(&repo),
        };
        self.undo.push(Undo::PolicyReplaced(repo, prev));
    }

    fn rollback(mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::RepositoryInserted(name) => {
                    self.tables.repositories.remove(&name);
                }
                Undo::RepositoryRemoved(repo) => {
                    self.tables.repositories.insert(repo.name.clone(), repo);
                }
                Undo::BranchInserted(id) => {
                    if let Some(branch) = self.tables.branches.remove(&id) {
                        if let Some(names) = self.tables.branch_names.get_mut(&branch.repository) {
                            names.remove(&branch.name);
                        }
                    }
                }
                Undo::BranchReplaced(branch) => {
                    self.tables.branches.insert(branch.id, branch);
                }
                Undo::BranchRemoved(branch) => {
                    self.tables
                        .branch_names
                        .entry(branch.repository.clone())
                        .or_default()
                        .insert(branch.name.clone(), branch.id);
                    self.tables.branches.insert(branch.id, branch);
                }
                Undo::CommitInserted(id, branch, seq) => {
                    self.tables.commits.remove(&id);
                    self.tables.commit_seqs.remove(&(branch, seq));
                }
                Undo::CommitRemoved(commit) => {
                    self.tables
                        .commit_seqs
                        .insert((commit.branch_id, commit.seq), commit.id.clone());
                    self.tables.commits.insert(commit.id.clone(), commit);
                }
                Undo::EntryInserted(key) => {
                    self.tables.entries.remove(&key);
                }
                Undo::EntryReplaced(row) | Undo::EntryRemoved(row) => {
                    self.tables.entries.insert(key_of(&row), row);
                }
                Undo::PolicyReplaced(repo, prev) => {
                    match prev {
                        Some(policy) => self.tables.retention_policies.insert(repo, policy),
                        None => self.tables.retention_policies.remove(&repo),
                    };
                }
                Undo::BranchIdCounter(prev) => {
                    self.tables.next_branch_id = prev;
                }
            }
        }
    }
}

/// In-memory transactional store with serializable isolation.
#[derive(Debug)]
pub struct MemStore {
    tables: RwLock<Tables>,
    lock_timeout: Duration,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl MemStore {
    /// Creates an empty store with the given lock deadline.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            lock_timeout,
        }
    }

    /// Runs a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Cancelled`] if the token fired,
    /// [`CatalogError::Timeout`] if the lock deadline expired, or whatever
    /// `f` fails with.
    pub fn read_tx<R>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&Tables) -> Result<R>,
    ) -> Result<R> {
        cancel.check()?;
        let tables = self
            .tables
            .try_read_for(self.lock_timeout)
            .ok_or(CatalogError::Timeout)?;
        f(&tables)
    }

    /// Runs a write transaction: all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Cancelled`] if the token fired before commit
    /// (the transaction is rolled back), [`CatalogError::Timeout`] if the
    /// lock deadline expired, or whatever `f` fails with (also rolled back).
    pub fn write_tx<R>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&mut Tx<'_>) -> Result<R>,
    ) -> Result<R> {
        cancel.check()?;
        let mut tables = self
            .tables
            .try_write_for(self.lock_timeout)
            .ok_or(CatalogError::Timeout)?;
        let mut tx = Tx {
            tables: &mut tables,
            undo: Vec::new(),
        };
        match f(&mut tx) {
            Ok(value) => {
                if cancel.is_cancelled() {
                    tx.rollback();
                    return Err(CatalogError::Cancelled);
                }
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::model::Metadata;

    fn store() -> MemStore {
        MemStore::default()
    }

    fn repo(name: &str) -> Repository {
        Repository {
            name: RepositoryName::new(name).unwrap(),
            storage_namespace: format!("mem://{name}"),
            default_branch: BranchName::new("master").unwrap(),
            created_at: Utc::now(),
        }
    }

    fn row(branch: BranchId, path: &str, min: CommitSeq, max: CommitSeq) -> EntryRow {
        EntryRow {
            branch_id: branch,
            path: path.to_string(),
            physical_address: format!("/addr{path}"),
            size: 1,
            checksum: "cs".to_string(),
            creation_date: Utc::now(),
            metadata: Metadata::new(),
            min_commit: min,
            max_commit: max,
            is_expired: false,
        }
    }

    #[test]
    fn test_write_tx_commits() {
        let s = store();
        let cancel = CancelToken::new();
        s.write_tx(&cancel, |tx| tx.insert_repository(repo("repo1")))
            .unwrap();
        s.read_tx(&cancel, |t| {
            t.repository(&RepositoryName::new("repo1").unwrap())?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_write_tx_rolls_back_on_error() {
        let s = store();
        let cancel = CancelToken::new();
        let err = s.write_tx(&cancel, |tx| {
            tx.insert_repository(repo("repo1"))?;
            let branch = tx.insert_branch(
                RepositoryName::new("repo1").unwrap(),
                BranchName::new("master").unwrap(),
                0,
                None,
                Vec::new(),
            )?;
            tx.insert_entry(row(branch.id, "/f", 0, MAX))?;
            Err::<(), _>(CatalogError::internal("boom"))
        });
        assert!(err.is_err());
        s.read_tx(&cancel, |t| {
            assert!(t
                .repository(&RepositoryName::new("repo1").unwrap())
                .is_err());
            assert_eq!(t.rows_of_branch(BranchId(1)).count(), 0);
            Ok(())
        })
        .unwrap();
    }

    const MAX: CommitSeq = crate::model::MAX_COMMIT;

    #[test]
    fn test_pre_commit_cancellation_rolls_back() {
        let s = store();
        let cancel = CancelToken::new();
        let result = s.write_tx(&cancel, |tx| {
            tx.insert_repository(repo("repo1"))?;
            // Fired mid-transaction, observed before commit.
            cancel.cancel();
            Ok(())
        });
        assert!(matches!(result, Err(CatalogError::Cancelled)));
        let fresh = CancelToken::new();
        s.read_tx(&fresh, |t| {
            assert!(t
                .repository(&RepositoryName::new("repo1").unwrap())
                .is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_repository_is_already_exists() {
        let s = store();
        let cancel = CancelToken::new();
        s.write_tx(&cancel, |tx| tx.insert_repository(repo("repo1")))
            .unwrap();
        let err = s
            .write_tx(&cancel, |tx| tx.insert_repository(repo("repo1")))
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }));
    }

    #[test]
    fn test_committed_candidate_picks_greatest_min() {
        let s = store();
        let cancel = CancelToken::new();
        let branch = BranchId(1);
        s.write_tx(&cancel, |tx| {
            tx.insert_entry(row(branch, "/f", 1, 2))?;
            tx.insert_entry(row(branch, "/f", 3, MAX))?;
            tx.insert_entry(row(branch, "/f", 0, MAX))?;
            Ok(())
        })
        .unwrap();
        s.read_tx(&cancel, |t| {
            assert_eq!(t.committed_candidate(branch, "/f", 2).unwrap().min_commit, 1);
            assert_eq!(t.committed_candidate(branch, "/f", 3).unwrap().min_commit, 3);
            assert_eq!(t.committed_candidate(branch, "/f", 9).unwrap().min_commit, 3);
            assert!(t.committed_candidate(branch, "/f", 0).is_none());
            // The uncommitted row is a separate key.
            assert!(t.uncommitted_row(branch, "/f").is_some());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_next_path_after_stays_on_branch() {
        let s = store();
        let cancel = CancelToken::new();
        s.write_tx(&cancel, |tx| {
            tx.insert_entry(row(BranchId(1), "/a", 0, MAX))?;
            tx.insert_entry(row(BranchId(1), "/b", 0, MAX))?;
            tx.insert_entry(row(BranchId(2), "/c", 0, MAX))?;
            Ok(())
        })
        .unwrap();
        s.read_tx(&cancel, |t| {
            assert_eq!(t.next_path_after(BranchId(1), ""), Some("/a"));
            assert_eq!(t.next_path_after(BranchId(1), "/a"), Some("/b"));
            assert_eq!(t.next_path_after(BranchId(1), "/b"), None);
            Ok(())
        })
        .unwrap();
    }
}
