//! Error types for the change parser.

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors that can occur while parsing a commit.
///
/// Every variant is fatal to the current parse; retries belong to the
/// outer job queue, not here.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// `svn` exited non-zero.
    #[error("svn exited with status {status}: {stderr}")]
    Exec { status: i32, stderr: String },

    /// SVN produced XML we do not understand.
    #[error("unexpected svn output: {0}")]
    Protocol(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// The parse was cancelled between subprocess invocations.
    #[error("parse cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
