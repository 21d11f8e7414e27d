//! svnscribe core library
//!
//! Reconstructs the full per-path effect set of a single SVN revision:
//! - SVN subprocess invocation (`svn log` / `svn ls` / `svn ls -R`)
//! - XML decoding of the three client output shapes
//! - File-kind resolution against prior revisions with positional batch
//!   binding
//! - Effect resolution (moves, copies, multicopy, directory expansion,
//!   parent closure)
//! - SQLite persistence of the path-change log and filesystem delta

pub mod change;
pub mod error;
pub mod invoker;
pub mod kinds;
pub mod listing;
pub mod parser;
pub mod paths;
pub mod resolver;
pub mod store;
pub mod writer;
pub mod xml;

pub use change::{
    ChangeKind, Effect, FileKind, LogEntry, Lookup, PathAction, RawPath, RepoSpec,
};
pub use error::{ParseError, Result};
pub use invoker::{CancelFlag, RunOutput, SvnCli, SvnInvoker, SvnRun};
pub use kinds::{FileKindResolver, LS_BATCH_LIMIT};
pub use listing::RecursiveLister;
pub use parser::{ChangeParser, ParseOutcome};
pub use resolver::EffectResolver;
pub use store::{FilesystemRow, PathChangeRow, SqliteStore};
pub use writer::{ChangeWriter, WriteSummary, INSERT_BATCH_LIMIT};
