//! SQLite-backed store for parsed changes.
//!
//! Holds the path and commit id tables plus the two relational views the
//! parser emits (path-change log and filesystem delta). WAL mode for write
//! throughput; the schema installs idempotently on open.

use crate::change::{ChangeKind, FileKind, RepoSpec};
use crate::error::{ParseError, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repository_path (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS repository_commit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    rev INTEGER NOT NULL,
    UNIQUE (repo_id, rev)
);
CREATE TABLE IF NOT EXISTS path_change (
    repo_id INTEGER NOT NULL,
    path_id INTEGER NOT NULL,
    commit_id INTEGER NOT NULL,
    target_path_id INTEGER,
    target_commit_id INTEGER,
    change_kind INTEGER NOT NULL,
    file_kind INTEGER NOT NULL,
    direct INTEGER NOT NULL,
    revision INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_path_change_commit
    ON path_change (commit_id);
CREATE INDEX IF NOT EXISTS idx_path_change_path
    ON path_change (repo_id, path_id);
CREATE TABLE IF NOT EXISTS filesystem_entry (
    repo_id INTEGER NOT NULL,
    parent_path_id INTEGER NOT NULL,
    revision INTEGER NOT NULL,
    path_id INTEGER NOT NULL,
    existed INTEGER NOT NULL,
    file_kind INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_filesystem_rev
    ON filesystem_entry (repo_id, revision);
CREATE INDEX IF NOT EXISTS idx_filesystem_parent
    ON filesystem_entry (repo_id, parent_path_id, revision);
";

/// One persisted path-change row, with path strings joined back in.
/// This is the shape the browse views query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathChangeRow {
    pub path: String,
    pub target_path: Option<String>,
    pub target_commit_id: Option<i64>,
    pub change_kind: ChangeKind,
    pub file_kind: FileKind,
    pub direct: bool,
    pub revision: u64,
}

/// One persisted filesystem-delta row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemRow {
    pub path: String,
    pub parent_path: String,
    pub existed: bool,
    pub file_kind: FileKind,
}

/// SQLite store for the change parser.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and install the schema.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Bulk idempotent path-id allocation: every requested path gets an id,
    /// existing rows are reused.
    pub fn lookup_or_create_paths(&self, paths: &[String]) -> Result<HashMap<String, i64>> {
        let conn = self.conn();
        {
            let mut insert =
                conn.prepare_cached("INSERT OR IGNORE INTO repository_path (path) VALUES (?1)")?;
            for path in paths {
                insert.execute(params![path])?;
            }
        }
        let mut out = HashMap::with_capacity(paths.len());
        let mut select = conn.prepare_cached("SELECT id FROM repository_path WHERE path = ?1")?;
        for path in paths {
            let id: i64 = select.query_row(params![path], |row| row.get(0))?;
            out.insert(path.clone(), id);
        }
        Ok(out)
    }

    /// Id of the `(repo, rev)` commit row, creating it if missing.
    pub fn ensure_commit(&self, repo: &RepoSpec, rev: u64) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO repository_commit (repo_id, rev) VALUES (?1, ?2)",
            params![repo.id, rev as i64],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM repository_commit WHERE repo_id = ?1 AND rev = ?2",
            params![repo.id, rev as i64],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Commit ids for the given revisions. Returns only revisions already
    /// recorded; unknown ones are absent from the result and end up as NULL
    /// provenance downstream.
    pub fn lookup_commit_ids(&self, repo: &RepoSpec, revs: &[u64]) -> Result<HashMap<u64, i64>> {
        let conn = self.conn();
        let mut out = HashMap::new();
        let mut select = conn
            .prepare_cached("SELECT id FROM repository_commit WHERE repo_id = ?1 AND rev = ?2")?;
        for rev in revs {
            let mut rows = select.query(params![repo.id, *rev as i64])?;
            if let Some(row) = rows.next()? {
                out.insert(*rev, row.get(0)?);
            }
        }
        Ok(out)
    }

    /// All path-change rows for one revision, ordered by path.
    pub fn path_changes(&self, repo: &RepoSpec, rev: u64) -> Result<Vec<PathChangeRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT p.path, tp.path, c.target_commit_id, c.change_kind, c.file_kind, \
             c.direct, c.revision \
             FROM path_change c \
             JOIN repository_path p ON p.id = c.path_id \
             LEFT JOIN repository_path tp ON tp.id = c.target_path_id \
             WHERE c.repo_id = ?1 AND c.revision = ?2 \
             ORDER BY p.path",
        )?;
        let mut rows = stmt.query(params![repo.id, rev as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(PathChangeRow {
                path: row.get(0)?,
                target_path: row.get(1)?,
                target_commit_id: row.get(2)?,
                change_kind: decode_change_kind(row.get(3)?)?,
                file_kind: decode_file_kind(row.get(4)?)?,
                direct: row.get::<_, i64>(5)? != 0,
                revision: row.get::<_, i64>(6)? as u64,
            });
        }
        Ok(out)
    }

    /// All filesystem-delta rows for one revision, ordered by path.
    pub fn filesystem_entries(&self, repo: &RepoSpec, rev: u64) -> Result<Vec<FilesystemRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT p.path, pp.path, f.existed, f.file_kind \
             FROM filesystem_entry f \
             JOIN repository_path p ON p.id = f.path_id \
             JOIN repository_path pp ON pp.id = f.parent_path_id \
             WHERE f.repo_id = ?1 AND f.revision = ?2 \
             ORDER BY p.path",
        )?;
        let mut rows = stmt.query(params![repo.id, rev as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(FilesystemRow {
                path: row.get(0)?,
                parent_path: row.get(1)?,
                existed: row.get::<_, i64>(2)? != 0,
                file_kind: decode_file_kind(row.get(3)?)?,
            });
        }
        Ok(out)
    }
}

fn decode_change_kind(code: i64) -> Result<ChangeKind> {
    ChangeKind::from_code(code)
        .ok_or_else(|| ParseError::Protocol(format!("unknown change kind code {}", code)))
}

fn decode_file_kind(code: i64) -> Result<FileKind> {
    FileKind::from_code(code)
        .ok_or_else(|| ParseError::Protocol(format!("unknown file kind code {}", code)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoSpec {
        RepoSpec::new(7, "TEST", "https://svn.example.com/repo")
    }

    #[test]
    fn test_path_allocation_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let paths = vec!["/a".to_string(), "/a/b".to_string()];
        let first = store.lookup_or_create_paths(&paths).unwrap();
        let second = store.lookup_or_create_paths(&paths).unwrap();
        assert_eq!(first, second);
        assert_ne!(first["/a"], first["/a/b"]);
    }

    #[test]
    fn test_commit_ids_known_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        let repo = repo();
        let id = store.ensure_commit(&repo, 41).unwrap();
        assert_eq!(store.ensure_commit(&repo, 41).unwrap(), id);

        let known = store.lookup_commit_ids(&repo, &[41, 99]).unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known[&41], id);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("changes.sqlite");
        {
            let store = SqliteStore::open(&db).unwrap();
            store.lookup_or_create_paths(&["/x".to_string()]).unwrap();
        }
        let store = SqliteStore::open(&db).unwrap();
        let ids = store.lookup_or_create_paths(&["/x".to_string()]).unwrap();
        assert_eq!(ids.len(), 1);
    }
}
