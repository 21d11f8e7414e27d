//! Recursive directory listing.

use crate::change::{FileKind, Lookup, RepoSpec};
use crate::error::Result;
use crate::invoker::SvnInvoker;
use crate::paths;
use crate::xml;
use std::collections::BTreeMap;

/// Lists every descendant of a directory at a revision.
///
/// One `svn ls -R` per call; the cost scales with subtree size, so callers
/// only reach for this when a directory is deleted, copied, or moved.
pub struct RecursiveLister<'a> {
    invoker: &'a SvnInvoker,
}

impl<'a> RecursiveLister<'a> {
    pub fn new(invoker: &'a SvnInvoker) -> Self {
        Self { invoker }
    }

    /// Full recursive map of `relative_path → kind` for the directory at
    /// the lookup point.
    pub async fn list(
        &self,
        repo: &RepoSpec,
        lookup: &Lookup,
    ) -> Result<BTreeMap<String, FileKind>> {
        let uri = format!("{}{}", repo.remote_uri, paths::encode(&lookup.path));
        let response = self.invoker.fetch_recursive_list(&uri, lookup.rev).await?;
        let entries = xml::decode_recursive_list(&response)?;
        tracing::debug!(path = %lookup.path, rev = lookup.rev, entries = entries.len(), "recursive listing");
        Ok(entries.into_iter().collect())
    }
}
