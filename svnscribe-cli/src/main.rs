//! svnscribe worker binary.
//!
//! Parses single commits of a remote SVN repository into a SQLite database
//! holding the path-change log and filesystem delta used by code browsing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use svnscribe_core::{
    ChangeParser, EffectResolver, ParseOutcome, RepoSpec, SqliteStore, SvnCli, SvnInvoker, xml,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "svnscribe")]
#[command(version = "0.1.0")]
#[command(about = "SVN commit change parser", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the change database
    InitDb {
        /// Database path
        #[arg(short, long, default_value = "./changes.sqlite")]
        db: PathBuf,
    },

    /// Parse one revision of a remote repository
    Parse {
        /// Remote repository root URI
        #[arg(long)]
        remote_uri: String,

        /// Revision to parse
        #[arg(long)]
        rev: u64,

        /// Database path
        #[arg(short, long, default_value = "./changes.sqlite")]
        db: PathBuf,

        /// Repository id in the database
        #[arg(long, default_value_t = 1)]
        repo_id: i64,

        /// Repository callsign for display (e.g. SCRIBE -> rSCRIBE42)
        #[arg(long, default_value = "REPO")]
        callsign: String,

        /// Resolve the effect set and print it as JSON without writing
        #[arg(long)]
        dry_run: bool,

        /// svn client binary
        #[arg(long, default_value = "svn")]
        svn: String,
    },

    /// Print the persisted path-change rows for a revision
    Changes {
        /// Database path
        #[arg(short, long, default_value = "./changes.sqlite")]
        db: PathBuf,

        /// Repository id in the database
        #[arg(long, default_value_t = 1)]
        repo_id: i64,

        /// Revision to show
        #[arg(long)]
        rev: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    match cli.command {
        Commands::InitDb { db } => {
            SqliteStore::open(&db)
                .with_context(|| format!("Failed to open database at {:?}", db))?;
            info!("Initialized change database at {:?}", db);
        }

        Commands::Parse {
            remote_uri,
            rev,
            db,
            repo_id,
            callsign,
            dry_run,
            svn,
        } => {
            let repo = RepoSpec::new(repo_id, callsign, remote_uri);
            let invoker = SvnInvoker::new(Arc::new(SvnCli::with_binary(svn)));

            if dry_run {
                let log_xml = invoker.fetch_log(&repo.remote_uri, rev).await?;
                let log = xml::decode_log(&log_xml)?;
                if log.paths.is_empty() {
                    println!("{} has no changed paths", repo.display_rev(rev));
                    return Ok(());
                }
                let effects = EffectResolver::new(&repo, &invoker).resolve(&log).await?;
                let mut ordered: Vec<_> = effects.values().collect();
                ordered.sort_by(|a, b| a.path.cmp(&b.path));
                println!("{}", serde_json::to_string_pretty(&ordered)?);
                return Ok(());
            }

            let store = SqliteStore::open(&db)
                .with_context(|| format!("Failed to open database at {:?}", db))?;
            let parser = ChangeParser::new(&invoker, &store);
            match parser
                .parse(&repo, rev)
                .await
                .with_context(|| format!("Failed to parse {}", repo.display_rev(rev)))?
            {
                ParseOutcome::Empty => {
                    println!("{}: no changed paths", repo.display_rev(rev));
                }
                ParseOutcome::Written {
                    effects,
                    path_changes,
                    filesystem_entries,
                } => {
                    println!(
                        "{}: {} effects, {} change rows, {} filesystem rows",
                        repo.display_rev(rev),
                        effects,
                        path_changes,
                        filesystem_entries
                    );
                }
            }
        }

        Commands::Changes { db, repo_id, rev } => {
            let store = SqliteStore::open(&db)
                .with_context(|| format!("Failed to open database at {:?}", db))?;
            let repo = RepoSpec::new(repo_id, "REPO", "");
            let rows = store.path_changes(&repo, rev)?;
            if rows.is_empty() {
                println!("no rows for r{}", rev);
                return Ok(());
            }
            for row in rows {
                let marker = if row.direct { "*" } else { " " };
                let target = match &row.target_path {
                    Some(target) => format!("  <- {}", target),
                    None => String::new(),
                };
                println!(
                    "{} {:<10} {:<9} {}{}",
                    marker,
                    format!("{:?}", row.change_kind),
                    format!("{:?}", row.file_kind),
                    row.path,
                    target
                );
            }
        }
    }

    Ok(())
}
