//! SVN subprocess invocation.
//!
//! The low-level boundary is the [`SvnRun`] trait: an opaque
//! `run(argv) -> (stdout, stderr, status)`. [`SvnCli`] implements it by
//! spawning the `svn` client; tests implement it with scripted output.
//!
//! [`SvnInvoker`] composes the argument lists for the three queries the
//! parser needs and maps non-zero exits to [`ParseError::Exec`]. Arguments
//! are passed as an argv vector, never through a shell. A [`CancelFlag`] is
//! checked before every invocation so an aborted parse stops between
//! subprocesses.

use crate::error::{ParseError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;

/// Shared cancellation flag for one parse.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw output of one subprocess run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Opaque subprocess execution boundary.
#[async_trait]
pub trait SvnRun: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<RunOutput>;
}

/// Runs the real `svn` client.
pub struct SvnCli {
    binary: String,
}

impl SvnCli {
    pub fn new() -> Self {
        Self {
            binary: "svn".to_string(),
        }
    }

    /// Use a non-default client binary (e.g. an absolute path).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SvnCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SvnRun for SvnCli {
    async fn run(&self, args: &[String]) -> Result<RunOutput> {
        let output = Command::new(&self.binary).args(args).output().await?;
        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// Builds and executes the three SVN queries the parser drives.
pub struct SvnInvoker {
    runner: Arc<dyn SvnRun>,
    cancel: CancelFlag,
}

impl SvnInvoker {
    pub fn new(runner: Arc<dyn SvnRun>) -> Self {
        Self {
            runner,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(runner: Arc<dyn SvnRun>, cancel: CancelFlag) -> Self {
        Self { runner, cancel }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// `svn log --verbose --xml --limit 1 <uri>@<rev>`
    pub async fn fetch_log(&self, uri: &str, rev: u64) -> Result<String> {
        let args = vec![
            "--non-interactive".to_string(),
            "log".to_string(),
            "--verbose".to_string(),
            "--xml".to_string(),
            "--limit".to_string(),
            "1".to_string(),
            format!("{}@{}", uri, rev),
        ];
        self.invoke(args).await
    }

    /// `svn ls --xml <uri1> <uri2> …` for a batch of already-encoded,
    /// revision-pinned URIs. One process per batch; `<list>` elements come
    /// back in argument order.
    pub async fn fetch_list(&self, uris: &[String]) -> Result<String> {
        let mut args = vec![
            "--non-interactive".to_string(),
            "ls".to_string(),
            "--xml".to_string(),
        ];
        args.extend(uris.iter().cloned());
        self.invoke(args).await
    }

    /// `svn ls -R --xml <uri>@<rev>`
    pub async fn fetch_recursive_list(&self, uri: &str, rev: u64) -> Result<String> {
        let args = vec![
            "--non-interactive".to_string(),
            "ls".to_string(),
            "-R".to_string(),
            "--xml".to_string(),
            format!("{}@{}", uri, rev),
        ];
        self.invoke(args).await
    }

    async fn invoke(&self, args: Vec<String>) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        tracing::debug!(?args, "invoking svn");
        let output = self.runner.run(&args).await?;
        if output.status != 0 {
            return Err(ParseError::Exec {
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }
}
