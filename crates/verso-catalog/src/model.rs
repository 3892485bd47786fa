//! The catalog data model: repositories, branches, commits, and entry rows.
//!
//! The entry row is the heart of the model. Its `[min_commit, max_commit]`
//! range (inclusive on both ends) says at which commits of its branch the row
//! is visible:
//!
//! - `min_commit == 0` — uncommitted: staged on the branch, not yet sealed.
//! - `max_commit == MAX_COMMIT` — current: no later row supersedes it.
//! - `min_commit == 0 && max_commit == 0` — tombstone: an uncommitted delete
//!   shadowing a committed or inherited row.
//! - `max_commit < min_commit` — a sealed deletion: the empty range marks the
//!   path deleted from `min_commit` onward and suppresses lineage inheritance.
//!
//! Rows never move between branches and, once committed, mutate only by
//! having `max_commit` narrowed or `is_expired` set (branch revert is the one
//! sanctioned exception to the narrowing rule).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use verso_core::{BranchName, RepositoryName};

use crate::error::{CatalogError, Result};

/// Per-branch monotonic commit sequence number, starting at 1.
pub type CommitSeq = u64;

/// Sentinel meaning "still current" in `max_commit`.
pub const MAX_COMMIT: CommitSeq = CommitSeq::MAX;

/// `min_commit` value of uncommitted rows.
pub const UNCOMMITTED: CommitSeq = 0;

/// Free-form string metadata attached to entries and commits.
///
/// Ordered so canonical serialization (and thus commit hashing) is
/// deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Store-assigned branch identifier, unique within a catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct BranchId(pub u64);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-hash commit identity (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Length of a full commit id in hex characters.
    pub const LEN: usize = 64;

    /// Wraps a digest already known to be valid lowercase hex.
    #[must_use]
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `s` has the shape of a commit id.
    #[must_use]
    pub fn looks_like(s: &str) -> bool {
        s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        if Self::looks_like(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(CatalogError::InvalidCommit {
                message: format!("'{s}' is not a commit id"),
            })
        }
    }
}

/// A repository: the unit of namespacing for branches and entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique repository name; doubles as the wire-level bucket id.
    pub name: RepositoryName,
    /// Opaque prefix under which blob addresses are allocated. The catalog
    /// never parses it.
    pub storage_namespace: String,
    /// Name of the branch created with the repository.
    pub default_branch: BranchName,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// How far into one ancestor branch a descendant can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageCommit {
    /// The ancestor branch.
    pub branch_id: BranchId,
    /// The ancestor's commit sequence at the branch point.
    pub seq: CommitSeq,
}

/// A branch: a named commit chain plus an uncommitted staging area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Store-assigned identifier.
    pub id: BranchId,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Branch name, unique within the repository.
    pub name: BranchName,
    /// Sequence of the branch's latest own commit; 0 before the first.
    pub head_seq: CommitSeq,
    /// Identity of the commit HEAD points at. For a fresh branch this is the
    /// source commit it was created from, or `None` on a bare default branch.
    pub head_commit: Option<CommitId>,
    /// Ancestor branches this branch inherits from, nearest parent first.
    /// Fixed at branch creation.
    pub lineage: Vec<LineageCommit>,
}

/// An immutable, content-addressed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Content-hash identity.
    pub id: CommitId,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Branch the commit was sealed on.
    pub branch_id: BranchId,
    /// Per-branch sequence number, starting at 1.
    pub seq: CommitSeq,
    /// Parent commits: one for a linear commit, two for a merge
    /// (destination head first, then source head).
    pub parents: Vec<CommitId>,
    /// Commit message.
    pub message: String,
    /// Who sealed the commit.
    pub committer: String,
    /// When the commit was sealed.
    pub creation_date: DateTime<Utc>,
    /// Free-form commit metadata.
    pub metadata: Metadata,
}

/// One entry row: an object version visible at a range of commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRow {
    /// Owning branch.
    pub branch_id: BranchId,
    /// Logical object path.
    pub path: String,
    /// Blob-store key under the repository's storage namespace.
    pub physical_address: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload checksum as recorded by the writer.
    pub checksum: String,
    /// When the object version was written.
    pub creation_date: DateTime<Utc>,
    /// Free-form entry metadata.
    pub metadata: Metadata,
    /// First commit at which the row is visible; 0 while uncommitted.
    pub min_commit: CommitSeq,
    /// Last commit at which the row is visible; [`MAX_COMMIT`] while current,
    /// 0 for an uncommitted tombstone.
    pub max_commit: CommitSeq,
    /// Set by the retention engine; expired rows are withheld from reads
    /// unless explicitly requested.
    pub is_expired: bool,
}

impl EntryRow {
    /// True while the row has not been sealed by a commit.
    #[must_use]
    pub const fn is_uncommitted(&self) -> bool {
        self.min_commit == UNCOMMITTED
    }

    /// True for an uncommitted delete marker.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.min_commit == UNCOMMITTED && self.max_commit == 0
    }

    /// True while no later row or deletion supersedes this one.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.max_commit == MAX_COMMIT
    }

    /// True for a sealed deletion marker (empty visibility range).
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.min_commit > UNCOMMITTED && self.max_commit < self.min_commit
    }

    /// True if the row is visible at commit sequence `seq` of its branch.
    #[must_use]
    pub const fn visible_at_seq(&self, seq: CommitSeq) -> bool {
        self.min_commit > UNCOMMITTED && self.min_commit <= seq && self.max_commit >= seq
    }
}

/// Public projection of a visible entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Logical object path.
    pub path: String,
    /// Blob-store key.
    pub physical_address: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload checksum.
    pub checksum: String,
    /// When the object version was written.
    pub creation_date: DateTime<Utc>,
    /// Free-form entry metadata.
    pub metadata: Metadata,
    /// Whether retention has marked the row expired.
    pub expired: bool,
}

impl From<&EntryRow> for Entry {
    fn from(row: &EntryRow) -> Self {
        Self {
            path: row.path.clone(),
            physical_address: row.physical_address.clone(),
            size: row.size,
            checksum: row.checksum.clone(),
            creation_date: row.creation_date,
            metadata: row.metadata.clone(),
            expired: row.is_expired,
        }
    }
}

/// Input to `create_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Logical object path.
    pub path: String,
    /// Blob-store key the payload was already written to.
    pub physical_address: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload checksum.
    pub checksum: String,
    /// Free-form entry metadata.
    pub metadata: Metadata,
    /// Version timestamp; defaults to now.
    pub creation_date: Option<DateTime<Utc>>,
}

impl NewEntry {
    /// Creates an entry input with empty metadata and a default timestamp.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        physical_address: impl Into<String>,
        size: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            physical_address: physical_address.into(),
            size,
            checksum: checksum.into(),
            metadata: Metadata::new(),
            creation_date: None,
        }
    }

    /// Sets the version timestamp.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.creation_date = Some(at);
        self
    }
}

/// Parseable address of one entry row, carried inside retention results so
/// `mark_expired` can find the exact rows a scan produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalObjectRef {
    /// Owning branch.
    pub branch_id: BranchId,
    /// The row's `min_commit` at scan time.
    pub min_commit: CommitSeq,
    /// The row's path.
    pub path: String,
}

impl InternalObjectRef {
    const PREFIX: &'static str = "int:v1";
}

impl fmt::Display for InternalObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            Self::PREFIX,
            self.branch_id.0,
            self.min_commit,
            self.path
        )
    }
}

impl FromStr for InternalObjectRef {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.splitn(5, ':').collect();
        let (branch, min, path) = match parts.as_slice() {
            ["int", "v1", branch, min, path] => (*branch, *min, *path),
            _ => {
                return Err(CatalogError::internal(format!(
                    "malformed internal object reference '{s}'"
                )))
            }
        };
        let branch_id = branch
            .parse::<u64>()
            .map_err(|_| CatalogError::internal(format!("bad branch id in '{s}'")))?;
        let min_commit = min
            .parse::<CommitSeq>()
            .map_err(|_| CatalogError::internal(format!("bad commit sequence in '{s}'")))?;
        Ok(Self {
            branch_id: BranchId(branch_id),
            min_commit,
            path: path.to_string(),
        })
    }
}
