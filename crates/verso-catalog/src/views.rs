//! The entry view engine: which row, if any, is visible at a reference.
//!
//! For a resolved reference the search is layered:
//!
//! 1. An `Uncommitted` request consults the branch's staging area first; a
//!    staged tombstone hides the path outright.
//! 2. The branch's own committed history at the effective sequence `c`: the
//!    candidate is the row with the greatest `min_commit ≤ c`. A candidate
//!    whose range has been narrowed below `c` marks the path deleted and
//!    suppresses lineage, exactly as if a tombstone sat at `max_commit`.
//! 3. Lineage ancestors in order, each bounded at its branch-point sequence;
//!    the first ancestor owning any candidate decides, so a deletion in a
//!    near parent hides versions in farther ones.
//!
//! The result is a pure function of the transactional snapshot.

use crate::error::Result;
use crate::model::{Entry, EntryRow};
use crate::refs::ResolvedRef;
use crate::store::Tables;

/// Marker appended to a common prefix to jump past its subtree when listing.
///
/// Sorts after every path a well-formed prefix can contain.
pub(crate) const DIRECTORY_TERMINATOR: char = '\u{10FFFF}';

/// Returns the row visible at `resolved` for `path`, or `None`.
///
/// Expired rows are returned; point-read and listing layers decide whether
/// to withhold them.
///
/// # Errors
///
/// Fails only if the reference's branch has vanished mid-transaction, which
/// the serializable store rules out.
pub fn visible_row(
    tables: &Tables,
    resolved: &ResolvedRef,
    path: &str,
) -> Result<Option<EntryRow>> {
    if resolved.includes_uncommitted() {
        if let Some(row) = tables.uncommitted_row(resolved.branch_id, path) {
            if row.is_tombstone() {
                return Ok(None);
            }
            return Ok(Some(row.clone()));
        }
    }

    let seq = resolved.seq;
    if seq > 0 {
        if let Some(candidate) = tables.committed_candidate(resolved.branch_id, path, seq) {
            if candidate.max_commit >= seq {
                return Ok(Some(candidate.clone()));
            }
            // Deleted on the branch itself; lineage stays hidden.
            return Ok(None);
        }
    }

    for ancestor in &resolved.lineage {
        if let Some(candidate) = tables.committed_candidate(ancestor.branch_id, path, ancestor.seq)
        {
            if candidate.max_commit >= ancestor.seq {
                return Ok(Some(candidate.clone()));
            }
            return Ok(None);
        }
    }

    Ok(None)
}

/// One listing result: a visible entry or a collapsed common prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    /// Entry path, or the common prefix including its trailing delimiter.
    pub path: String,
    /// The entry, absent for common prefixes.
    pub entry: Option<Entry>,
    /// True when this result collapses a group of deeper paths.
    pub is_common_prefix: bool,
}

/// A page of listing results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntriesResult {
    /// The page, in lexicographic path order.
    pub entries: Vec<ListedEntry>,
    /// True when the listing was truncated at the requested limit.
    pub has_more: bool,
}

/// Lists entries visible at `resolved` under `prefix`, strictly after
/// `after`, collapsing groups at `delimiter` when it is non-empty.
///
/// `limit` of `usize::MAX` means unbounded.
///
/// # Errors
///
/// Propagates visibility-resolution failures.
#[allow(clippy::too_many_arguments)]
pub fn list_entries(
    tables: &Tables,
    resolved: &ResolvedRef,
    prefix: &str,
    after: &str,
    limit: usize,
    delimiter: &str,
    include_expired: bool,
) -> Result<ListEntriesResult> {
    let mut marker = if after.is_empty() {
        prefix.to_string()
    } else if !delimiter.is_empty() && after.ends_with(delimiter) {
        // A common-prefix token skips its whole subtree.
        let mut m = after.to_string();
        m.push(DIRECTORY_TERMINATOR);
        m
    } else {
        after.to_string()
    };
    if marker.as_str() < prefix {
        marker = prefix.to_string();
    }

    let target = limit.saturating_add(1);
    let mut entries: Vec<ListedEntry> = Vec::new();
    let mut has_more = false;

    while let Some((path, row)) = next_visible(tables, resolved, prefix, &marker, include_expired)?
    {
        let result = match split_common_prefix(&path, prefix, delimiter) {
            Some(group) => {
                marker.clear();
                marker.push_str(&group);
                marker.push(DIRECTORY_TERMINATOR);
                if entries.last().is_some_and(|last| last.path == group) {
                    // The group name was already emitted as a regular entry
                    // (a path ending with the delimiter); fold the members in.
                    continue;
                }
                ListedEntry {
                    path: group,
                    entry: None,
                    is_common_prefix: true,
                }
            }
            None => {
                marker.clear();
                marker.push_str(&path);
                ListedEntry {
                    path,
                    entry: Some(Entry::from(&row)),
                    is_common_prefix: false,
                }
            }
        };
        entries.push(result);
        if entries.len() == target {
            has_more = true;
            entries.pop();
            break;
        }
    }

    Ok(ListEntriesResult { entries, has_more })
}

/// Returns the group name when `path` collapses under `delimiter`.
///
/// The delimiter search begins one character past the prefix, so a path's
/// leading character never forms a group of its own; a path that *ends* with
/// the delimiter is a regular entry and never collapses into itself.
fn split_common_prefix(path: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let rest = &path[prefix.len()..];
    let skip = rest.chars().next().map_or(0, char::len_utf8);
    let found = rest.get(skip..)?.find(delimiter)?;
    let end = skip + found + delimiter.len();
    if end == rest.len() {
        return None;
    }
    Some(format!("{prefix}{}", &rest[..end]))
}

/// Finds the first visible path strictly greater than `marker` within
/// `prefix`, advancing past hidden rows.
fn next_visible(
    tables: &Tables,
    resolved: &ResolvedRef,
    prefix: &str,
    marker: &str,
    include_expired: bool,
) -> Result<Option<(String, EntryRow)>> {
    let mut lower = marker.to_string();
    loop {
        let mut candidate: Option<&str> = None;
        let own = tables.next_path_after(resolved.branch_id, &lower);
        for path in own.into_iter().chain(
            resolved
                .lineage
                .iter()
                .filter_map(|lc| tables.next_path_after(lc.branch_id, &lower)),
        ) {
            candidate = Some(match candidate {
                Some(best) if best <= path => best,
                _ => path,
            });
        }
        let Some(path) = candidate else {
            return Ok(None);
        };
        if !path.starts_with(prefix) {
            return Ok(None);
        }
        let path = path.to_string();
        match visible_row(tables, resolved, &path)? {
            Some(row) if include_expired || !row.is_expired => return Ok(Some((path, row))),
            _ => lower = path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_common_prefix_rules() {
        // Leading delimiter right after the prefix does not group.
        assert_eq!(split_common_prefix("/file1", "", "/"), None);
        // A deeper delimiter groups up to and including it.
        assert_eq!(
            split_common_prefix("/file2/xxx", "", "/"),
            Some("/file2/".to_string())
        );
        // A path ending with the delimiter is an entry, not a group.
        assert_eq!(split_common_prefix("file3/", "", "/"), None);
        assert_eq!(split_common_prefix("/file2/", "", "/"), None);
        // Prefix-relative grouping.
        assert_eq!(
            split_common_prefix("file6/zzz/zzz", "file6/", "/"),
            Some("file6/zzz/".to_string())
        );
        assert_eq!(split_common_prefix("file6/yyy", "file6/", "/"), None);
        // No delimiter, no grouping.
        assert_eq!(split_common_prefix("/file2/xxx", "", ""), None);
    }
}
