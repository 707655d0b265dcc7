//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod scan;
mod sync;
mod versions;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::DocumentRef;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Keep embedded citations, statistics and files in sync with their stores")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use an in-memory backend seeded from the local file instead of the API
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Which document to work on.
#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    /// Project ID
    #[arg(long, env = "DOCSYNC_PROJECT")]
    project: String,
    /// Document ID
    #[arg(long, env = "DOCSYNC_DOCUMENT")]
    document: String,
}

impl DocumentArgs {
    pub fn doc_ref(&self) -> DocumentRef {
        DocumentRef::new(&self.project, &self.document)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the references embedded in an HTML file
    Scan {
        /// HTML file to scan
        file: PathBuf,
        /// Also print word, character and page counts
        #[arg(short, long)]
        metrics: bool,
    },

    /// Save a local HTML file to a document and run every sync pass
    Sync {
        /// HTML file holding the document content
        file: PathBuf,
        #[command(flatten)]
        target: DocumentArgs,
        /// New document title
        #[arg(long)]
        title: Option<String>,
    },

    /// Save a local file, then pull statistics changes into it
    Pull {
        /// HTML file holding the document content
        file: PathBuf,
        #[command(flatten)]
        target: DocumentArgs,
    },

    /// Mirror a document into a file and keep it in sync while it is edited
    Watch {
        /// File to mirror the document into (overwritten on start)
        file: PathBuf,
        #[command(flatten)]
        target: DocumentArgs,
        /// Seconds between checks of the file for changes
        #[arg(long, default_value = "1")]
        poll: u64,
    },

    /// Manage document versions
    Versions {
        #[command(subcommand)]
        command: VersionCommands,
    },
}

#[derive(Subcommand)]
enum VersionCommands {
    /// List versions, newest first
    List {
        #[command(flatten)]
        target: DocumentArgs,
    },
    /// Snapshot the stored document
    Create {
        #[command(flatten)]
        target: DocumentArgs,
        /// Version note
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Restore a version into the stored document
    Restore {
        #[command(flatten)]
        target: DocumentArgs,
        /// Version ID
        version_id: String,
        /// Also write the restored content to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, _config) = load_settings_with_options(options).await;
    let offline = cli.offline;

    match cli.command {
        Commands::Scan { file, metrics } => scan::cmd_scan(&file, metrics).await,
        Commands::Sync {
            file,
            target,
            title,
        } => sync::cmd_sync(&settings, offline, &file, &target.doc_ref(), title).await,
        Commands::Pull { file, target } => {
            sync::cmd_pull(&settings, offline, &file, &target.doc_ref()).await
        }
        Commands::Watch { file, target, poll } => {
            sync::cmd_watch(&settings, offline, &file, &target.doc_ref(), poll).await
        }
        Commands::Versions { command } => match command {
            VersionCommands::List { target } => {
                versions::cmd_versions_list(&settings, offline, &target.doc_ref()).await
            }
            VersionCommands::Create { target, note } => {
                versions::cmd_versions_create(&settings, offline, &target.doc_ref(), note).await
            }
            VersionCommands::Restore {
                target,
                version_id,
                output,
            } => {
                versions::cmd_versions_restore(
                    &settings,
                    offline,
                    &target.doc_ref(),
                    &version_id,
                    output.as_deref(),
                )
                .await
            }
        },
    }
}
