//! Change model for a parsed commit.
//!
//! A single `svn log` entry reports a flat list of top-level path actions.
//! The resolver expands that into the full per-path effect set: every
//! affected leaf with its change kind, file kind, and copy provenance.

use serde::{Deserialize, Serialize};

/// A repository being parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Persistent repository id.
    pub id: i64,
    /// Short identifier used in revision display (e.g. `SCRIBE` for `rSCRIBE123`).
    pub callsign: String,
    /// Remote repository root URI, without a trailing slash.
    pub remote_uri: String,
}

impl RepoSpec {
    pub fn new(id: i64, callsign: impl Into<String>, remote_uri: impl Into<String>) -> Self {
        let uri: String = remote_uri.into();
        Self {
            id,
            callsign: callsign.into(),
            remote_uri: uri.trim_end_matches('/').to_string(),
        }
    }

    /// Display form of a revision in this repository, e.g. `rSCRIBE42`.
    pub fn display_rev(&self, rev: u64) -> String {
        format!("r{}{}", self.callsign, rev)
    }
}

/// Action letter reported by `svn log --verbose` for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathAction {
    Add,
    Delete,
    Modify,
    Replace,
}

impl PathAction {
    pub fn from_letter(s: &str) -> Option<Self> {
        match s {
            "A" => Some(PathAction::Add),
            "D" => Some(PathAction::Delete),
            "M" => Some(PathAction::Modify),
            "R" => Some(PathAction::Replace),
            _ => None,
        }
    }
}

/// One path as reported by `svn log` for the target revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPath {
    /// Absolute repository path beginning with `/`.
    pub path: String,
    pub action: PathAction,
    /// Prior path, when SVN records provenance.
    pub copy_from_path: Option<String>,
    /// Prior revision; set iff `copy_from_path` is set.
    pub copy_from_rev: Option<u64>,
}

/// A decoded `svn log` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub rev: u64,
    pub paths: Vec<RawPath>,
}

/// A point in repository history for kind/list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub path: String,
    pub rev: u64,
}

impl Lookup {
    pub fn new(path: impl Into<String>, rev: u64) -> Self {
        Self { path: path.into(), rev }
    }
}

/// What a path is at a lookup point.
///
/// `Deleted` is synthetic: the path is not present at the lookup point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Deleted,
}

impl FileKind {
    /// Stable code for the TINYINT columns.
    pub fn code(self) -> i64 {
        match self {
            FileKind::File => 1,
            FileKind::Directory => 2,
            FileKind::Deleted => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(FileKind::File),
            2 => Some(FileKind::Directory),
            3 => Some(FileKind::Deleted),
            _ => None,
        }
    }
}

/// The resolver's output vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Change,
    Delete,
    MoveAway,
    CopyAway,
    MoveHere,
    CopyHere,
    /// A single source copied to two or more destinations and then removed.
    Multicopy,
    /// Synthetic: a directory that is an ancestor of some changed path.
    Child,
}

impl ChangeKind {
    /// Stable code for the TINYINT columns.
    pub fn code(self) -> i64 {
        match self {
            ChangeKind::Add => 1,
            ChangeKind::Change => 2,
            ChangeKind::Delete => 3,
            ChangeKind::MoveAway => 4,
            ChangeKind::CopyAway => 5,
            ChangeKind::MoveHere => 6,
            ChangeKind::CopyHere => 7,
            ChangeKind::Multicopy => 8,
            ChangeKind::Child => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ChangeKind::Add),
            2 => Some(ChangeKind::Change),
            3 => Some(ChangeKind::Delete),
            4 => Some(ChangeKind::MoveAway),
            5 => Some(ChangeKind::CopyAway),
            6 => Some(ChangeKind::MoveHere),
            7 => Some(ChangeKind::CopyHere),
            8 => Some(ChangeKind::Multicopy),
            9 => Some(ChangeKind::Child),
            _ => None,
        }
    }

    /// Whether the path is gone after a change of this kind.
    pub fn removes_path(self) -> bool {
        matches!(
            self,
            ChangeKind::Delete | ChangeKind::MoveAway | ChangeKind::Multicopy
        )
    }
}

/// One effect in the final per-path set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    /// Absolute repository path.
    pub path: String,
    /// Provenance pair; set together or not at all.
    pub target_path: Option<String>,
    pub target_rev: Option<u64>,
    /// Whether this effect was directly enumerated in the log, as opposed
    /// to synthesized by recursion or parent closure.
    pub direct: bool,
    pub change_kind: ChangeKind,
    pub file_kind: FileKind,
}

impl Effect {
    pub fn new(path: impl Into<String>, change_kind: ChangeKind, file_kind: FileKind) -> Self {
        Self {
            path: path.into(),
            target_path: None,
            target_rev: None,
            direct: true,
            change_kind,
            file_kind,
        }
    }

    pub fn indirect(mut self) -> Self {
        self.direct = false;
        self
    }

    pub fn with_target(mut self, path: impl Into<String>, rev: u64) -> Self {
        self.target_path = Some(path.into());
        self.target_rev = Some(rev);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_letters() {
        assert_eq!(PathAction::from_letter("A"), Some(PathAction::Add));
        assert_eq!(PathAction::from_letter("D"), Some(PathAction::Delete));
        assert_eq!(PathAction::from_letter("M"), Some(PathAction::Modify));
        assert_eq!(PathAction::from_letter("R"), Some(PathAction::Replace));
        assert_eq!(PathAction::from_letter("X"), None);
    }

    #[test]
    fn test_change_kind_codes_roundtrip() {
        for kind in [
            ChangeKind::Add,
            ChangeKind::Change,
            ChangeKind::Delete,
            ChangeKind::MoveAway,
            ChangeKind::CopyAway,
            ChangeKind::MoveHere,
            ChangeKind::CopyHere,
            ChangeKind::Multicopy,
            ChangeKind::Child,
        ] {
            assert_eq!(ChangeKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_file_kind_codes_roundtrip() {
        for kind in [FileKind::File, FileKind::Directory, FileKind::Deleted] {
            assert_eq!(FileKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_repo_spec_trims_uri() {
        let repo = RepoSpec::new(1, "SCRIBE", "https://svn.example.com/repo/");
        assert_eq!(repo.remote_uri, "https://svn.example.com/repo");
        assert_eq!(repo.display_rev(42), "rSCRIBE42");
    }
}
