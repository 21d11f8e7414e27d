//! Persistence of the resolved effect set.
//!
//! Two emissions per `(repository, commit)`:
//! - the path-change log, one row per effect
//! - the filesystem delta, one row per effect that represents a real node
//!   under a parent (indirect copy-away effects and the root are skipped)
//!
//! Both are delete-then-insert inside a single transaction, so a re-parse
//! is idempotent and a failure leaves the previous rows intact.

use crate::change::{ChangeKind, Effect, RepoSpec};
use crate::error::Result;
use crate::paths;
use crate::store::SqliteStore;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Transaction};
use std::collections::HashMap;

/// Maximum rows per INSERT statement.
pub const INSERT_BATCH_LIMIT: usize = 512;

/// Row counts written for one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub path_changes: usize,
    pub filesystem_entries: usize,
}

/// Writes the two tabular views for one parsed commit.
pub struct ChangeWriter<'a> {
    store: &'a SqliteStore,
}

impl<'a> ChangeWriter<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Replace both emissions for this commit with rows derived from
    /// `effects`. `path_ids` must cover every effect path, target path, and
    /// parent path (the parent closure guarantees parents are effects);
    /// `target_commit_ids` may be partial — unknown target revisions
    /// persist as NULL.
    pub fn write(
        &self,
        repo: &RepoSpec,
        rev: u64,
        commit_id: i64,
        effects: &HashMap<String, Effect>,
        path_ids: &HashMap<String, i64>,
        target_commit_ids: &HashMap<u64, i64>,
    ) -> Result<WriteSummary> {
        // Stable row order keeps re-parses byte-identical.
        let mut ordered: Vec<&Effect> = effects.values().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));

        let mut conn = self.store.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM path_change WHERE commit_id = ?1",
            params![commit_id],
        )?;
        let mut change_rows: Vec<Vec<Value>> = Vec::with_capacity(ordered.len());
        for effect in &ordered {
            let target_path_id = effect
                .target_path
                .as_ref()
                .and_then(|p| path_ids.get(p))
                .copied();
            let target_commit_id = effect
                .target_rev
                .and_then(|r| target_commit_ids.get(&r))
                .copied();
            change_rows.push(vec![
                Value::Integer(repo.id),
                Value::Integer(path_ids[&effect.path]),
                Value::Integer(commit_id),
                opt(target_path_id),
                opt(target_commit_id),
                Value::Integer(effect.change_kind.code()),
                Value::Integer(effect.file_kind.code()),
                Value::Integer(effect.direct as i64),
                Value::Integer(rev as i64),
            ]);
        }
        insert_batched(
            &tx,
            "INSERT INTO path_change (repo_id, path_id, commit_id, target_path_id, \
             target_commit_id, change_kind, file_kind, direct, revision)",
            9,
            &change_rows,
        )?;

        tx.execute(
            "DELETE FROM filesystem_entry WHERE repo_id = ?1 AND revision = ?2",
            params![repo.id, rev as i64],
        )?;
        let mut fs_rows: Vec<Vec<Value>> = Vec::new();
        for effect in &ordered {
            // Indirect copy-away is provenance bookkeeping, not a node under
            // its parent; the root has no meaningful parent.
            if !effect.direct && effect.change_kind == ChangeKind::CopyAway {
                continue;
            }
            if effect.path == "/" {
                continue;
            }
            let existed = !effect.change_kind.removes_path();
            fs_rows.push(vec![
                Value::Integer(repo.id),
                Value::Integer(path_ids[&paths::parent(&effect.path)]),
                Value::Integer(rev as i64),
                Value::Integer(path_ids[&effect.path]),
                Value::Integer(existed as i64),
                Value::Integer(effect.file_kind.code()),
            ]);
        }
        insert_batched(
            &tx,
            "INSERT INTO filesystem_entry (repo_id, parent_path_id, revision, path_id, \
             existed, file_kind)",
            6,
            &fs_rows,
        )?;

        tx.commit()?;
        Ok(WriteSummary {
            path_changes: change_rows.len(),
            filesystem_entries: fs_rows.len(),
        })
    }
}

fn opt(value: Option<i64>) -> Value {
    match value {
        Some(v) => Value::Integer(v),
        None => Value::Null,
    }
}

fn insert_batched(
    tx: &Transaction<'_>,
    insert_prefix: &str,
    columns: usize,
    rows: &[Vec<Value>],
) -> Result<()> {
    let row_placeholder = format!(
        "({})",
        vec!["?"; columns].join(", ")
    );
    for chunk in rows.chunks(INSERT_BATCH_LIMIT) {
        let placeholders = vec![row_placeholder.as_str(); chunk.len()].join(", ");
        let sql = format!("{} VALUES {}", insert_prefix, placeholders);
        let values = chunk.iter().flatten().cloned();
        tx.execute(&sql, params_from_iter(values))?;
    }
    Ok(())
}
