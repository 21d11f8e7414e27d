//! One-commit parse orchestration.
//!
//! `parse(repo, rev)` drives the whole pipeline: fetch and decode the log
//! entry, resolve the effect set, allocate ids, and persist both views.
//! Everything lives in memory for the duration of the call; there is no
//! cross-call state.

use crate::change::RepoSpec;
use crate::error::{ParseError, Result};
use crate::invoker::SvnInvoker;
use crate::resolver::EffectResolver;
use crate::store::SqliteStore;
use crate::writer::ChangeWriter;
use crate::xml;
use std::collections::HashSet;
use tracing::{info, warn};

/// Result of parsing one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The log entry had no `<paths>` block; nothing was emitted. Some
    /// historical repositories contain such commits.
    Empty,
    Written {
        effects: usize,
        path_changes: usize,
        filesystem_entries: usize,
    },
}

/// Parses single commits of a remote SVN repository into the store.
pub struct ChangeParser<'a> {
    invoker: &'a SvnInvoker,
    store: &'a SqliteStore,
}

impl<'a> ChangeParser<'a> {
    pub fn new(invoker: &'a SvnInvoker, store: &'a SqliteStore) -> Self {
        Self { invoker, store }
    }

    /// Parse one revision and persist its effect set.
    ///
    /// All errors are fatal to this call and leave previously persisted
    /// rows for `(repo, rev)` intact; retries belong to the caller.
    pub async fn parse(&self, repo: &RepoSpec, rev: u64) -> Result<ParseOutcome> {
        let log_xml = self.invoker.fetch_log(&repo.remote_uri, rev).await?;
        let log = xml::decode_log(&log_xml)?;
        if log.rev != rev {
            return Err(ParseError::Protocol(format!(
                "asked for r{} but svn answered r{}",
                rev, log.rev
            )));
        }
        if log.paths.is_empty() {
            warn!(rev, repo = %repo.callsign, "commit has no changed paths");
            return Ok(ParseOutcome::Empty);
        }

        let resolver = EffectResolver::new(repo, self.invoker);
        let effects = resolver.resolve(&log).await?;

        if self.invoker.cancel_flag().is_cancelled() {
            return Err(ParseError::Cancelled);
        }

        // Allocate ids for every path and target path in one bulk upsert,
        // then look up target commits (known-only).
        let mut all_paths: HashSet<&str> = HashSet::new();
        for effect in effects.values() {
            all_paths.insert(&effect.path);
            if let Some(target) = &effect.target_path {
                all_paths.insert(target);
            }
        }
        let all_paths: Vec<String> = all_paths.into_iter().map(str::to_string).collect();
        let path_ids = self.store.lookup_or_create_paths(&all_paths)?;

        let commit_id = self.store.ensure_commit(repo, rev)?;
        let target_revs: Vec<u64> = effects
            .values()
            .filter_map(|e| e.target_rev)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let target_commit_ids = self.store.lookup_commit_ids(repo, &target_revs)?;

        let summary = ChangeWriter::new(self.store).write(
            repo,
            rev,
            commit_id,
            &effects,
            &path_ids,
            &target_commit_ids,
        )?;

        info!(
            commit = %repo.display_rev(rev),
            effects = effects.len(),
            path_changes = summary.path_changes,
            filesystem_entries = summary.filesystem_entries,
            "parsed commit"
        );
        Ok(ParseOutcome::Written {
            effects: effects.len(),
            path_changes: summary.path_changes,
            filesystem_entries: summary.filesystem_entries,
        })
    }
}
