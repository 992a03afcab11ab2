//! Workbench CLI - wb command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod util;

/// Workbench - crash-safe published/draft file store with checkpoints
#[derive(Parser)]
#[command(name = "wb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding all workbenches
    #[arg(long, env = "WB_BASE_DIR", default_value = ".workbenches", global = true)]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new workbench
    Init {
        /// Display name
        name: String,
    },
    /// List workbenches
    List,
    /// Show a workbench: draft state, generation, recent checkpoints
    Status {
        /// Workbench ID (or unique prefix, or exact name)
        workbench: String,
    },
    /// Draft lifecycle
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Atomically promote the draft to published
    Publish {
        /// Workbench ID
        workbench: String,
    },
    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Draft revision undo ring
    Revision {
        #[command(subcommand)]
        action: RevisionAction,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Create a draft from published
    Create {
        /// Workbench ID
        workbench: String,
        /// Who or what is creating the draft
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Discard the draft, keeping published untouched
    Discard {
        /// Workbench ID
        workbench: String,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Snapshot published into a new checkpoint
    Create {
        /// Workbench ID
        workbench: String,
        /// Why the checkpoint is being taken
        #[arg(long, default_value = "manual")]
        reason: String,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },
    /// List checkpoints, newest first
    List {
        /// Workbench ID
        workbench: String,
    },
    /// Show one checkpoint
    Show {
        /// Workbench ID
        workbench: String,
        /// Checkpoint ID (or unique prefix)
        checkpoint: String,
    },
    /// Swap a checkpoint back into place as published
    Restore {
        /// Workbench ID
        workbench: String,
        /// Checkpoint ID (or unique prefix)
        checkpoint: String,
    },
}

#[derive(Subcommand)]
enum RevisionAction {
    /// Record the current draft state at a conversation point
    Snapshot {
        /// Workbench ID
        workbench: String,
        /// Conversation head pointer (message ID)
        pointer: String,
    },
    /// Rewind the draft to a recorded point
    Restore {
        /// Workbench ID
        workbench: String,
        /// Conversation head pointer (message ID)
        pointer: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = cli.base_dir;

    match cli.command {
        Commands::Init { name } => cmd::init::run(&base_dir, &name),
        Commands::List => cmd::list::run(&base_dir),
        Commands::Status { workbench } => cmd::status::run(&base_dir, &workbench),
        Commands::Draft { action } => match action {
            DraftAction::Create { workbench, source } => {
                cmd::draft::create(&base_dir, &workbench, &source)
            }
            DraftAction::Discard { workbench } => cmd::draft::discard(&base_dir, &workbench),
        },
        Commands::Publish { workbench } => cmd::publish::run(&base_dir, &workbench),
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Create {
                workbench,
                reason,
                description,
            } => cmd::checkpoint::create(&base_dir, &workbench, &reason, description),
            CheckpointAction::List { workbench } => cmd::checkpoint::list(&base_dir, &workbench),
            CheckpointAction::Show {
                workbench,
                checkpoint,
            } => cmd::checkpoint::show(&base_dir, &workbench, &checkpoint),
            CheckpointAction::Restore {
                workbench,
                checkpoint,
            } => cmd::checkpoint::restore(&base_dir, &workbench, &checkpoint),
        },
        Commands::Revision { action } => match action {
            RevisionAction::Snapshot { workbench, pointer } => {
                cmd::revision::snapshot(&base_dir, &workbench, &pointer)
            }
            RevisionAction::Restore { workbench, pointer } => {
                cmd::revision::restore(&base_dir, &workbench, &pointer)
            }
        },
    }
}
