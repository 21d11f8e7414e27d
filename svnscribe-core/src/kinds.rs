//! File-kind resolution.
//!
//! SVN has no single query that reports a path's kind at a revision, and
//! `svn ls` on the path itself only works for directories. The resolver
//! therefore lists each path's *parent* and looks for an entry matching the
//! child name.
//!
//! Batched `svn ls` output carries no request echo: two requests for the
//! same parent path at different revisions produce indistinguishable
//! `<list>` elements. Requests are therefore bound to responses strictly
//! positionally — an ordered queue of request groups, never a hash by URI.
//! The queue is reversed up front so each successful bind is a cheap
//! `Vec::pop`; batches are issued from the tail, re-reversed into
//! submission order.

use crate::change::{FileKind, Lookup, RepoSpec};
use crate::error::{ParseError, Result};
use crate::invoker::SvnInvoker;
use crate::paths;
use crate::xml;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Maximum URIs per `svn ls` process, bounding argv size.
pub const LS_BATCH_LIMIT: usize = 64;

struct ParentGroup {
    uri: String,
    /// Parent path with any trailing `/` trimmed, for child-key formation.
    parent: String,
    rev: u64,
    requested: HashSet<String>,
}

/// Classifies paths as file, directory, or deleted at given lookup points.
pub struct FileKindResolver<'a> {
    invoker: &'a SvnInvoker,
}

impl<'a> FileKindResolver<'a> {
    pub fn new(invoker: &'a SvnInvoker) -> Self {
        Self { invoker }
    }

    /// Resolve the kind of every requested path at its lookup point.
    ///
    /// Paths absent from their parent listing resolve to
    /// [`FileKind::Deleted`].
    pub async fn resolve_kinds(
        &self,
        repo: &RepoSpec,
        lookups: &HashMap<String, Lookup>,
    ) -> Result<HashMap<String, FileKind>> {
        let mut kinds = HashMap::new();
        if lookups.is_empty() {
            return Ok(kinds);
        }

        // Group requests under their parent URI, in a deterministic order.
        let ordered: BTreeMap<&String, &Lookup> = lookups.iter().collect();
        let mut groups: Vec<ParentGroup> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for (_, lookup) in ordered {
            // The root always exists and has no parent to list.
            if lookup.path == "/" {
                continue;
            }
            let parent = paths::parent(&lookup.path);
            let uri = format!(
                "{}{}@{}",
                repo.remote_uri,
                paths::encode(&parent),
                lookup.rev
            );
            let idx = match group_index.get(&uri) {
                Some(idx) => *idx,
                None => {
                    groups.push(ParentGroup {
                        uri: uri.clone(),
                        parent: parent.trim_end_matches('/').to_string(),
                        rev: lookup.rev,
                        requested: HashSet::new(),
                    });
                    group_index.insert(uri, groups.len() - 1);
                    groups.len() - 1
                }
            };
            // Requests are keyed by the caller's map key, but matched against
            // the listing at the lookup *location*.
            groups[idx]
                .requested
                .insert(lookup.path.trim_end_matches('/').to_string());
        }

        tracing::debug!(
            requests = lookups.len(),
            parents = groups.len(),
            "planned file-kind lookups"
        );

        // Reverse once so positional binding pops in O(1).
        groups.reverse();
        let mut found: HashMap<(String, u64), FileKind> = HashMap::new();
        while !groups.is_empty() {
            let take = groups.len().min(LS_BATCH_LIMIT);
            // The batch is the queue tail; re-reverse into submission order.
            let uris: Vec<String> = groups[groups.len() - take..]
                .iter()
                .rev()
                .map(|g| g.uri.clone())
                .collect();
            let response = self.invoker.fetch_list(&uris).await?;
            let lists = xml::decode_flat_list(&response)?;
            if lists.len() != take {
                return Err(ParseError::Protocol(format!(
                    "expected {} list elements, got {}",
                    take,
                    lists.len()
                )));
            }
            for (list_uri, entries) in lists {
                let group = groups.pop().ok_or_else(|| {
                    ParseError::Protocol("list element without a pending request".to_string())
                })?;
                tracing::trace!(request = %group.uri, response = %list_uri, "bound listing");
                for (name, kind) in entries {
                    let full = format!("{}/{}", group.parent, name);
                    if group.requested.contains(&full) {
                        found.insert((full, group.rev), kind);
                    }
                }
            }
        }

        for (path, lookup) in lookups {
            if lookup.path == "/" {
                kinds.insert(path.clone(), FileKind::Directory);
                continue;
            }
            let location = lookup.path.trim_end_matches('/').to_string();
            let kind = found
                .get(&(location, lookup.rev))
                .copied()
                .unwrap_or(FileKind::Deleted);
            kinds.insert(path.clone(), kind);
        }
        Ok(kinds)
    }
}
