//! CLI interface for the extraction/hierarchy pipeline.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputMode;

#[derive(Parser)]
#[command(name = "loregraph", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.loregraph)
    #[arg(long, env = "LOREGRAPH_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a novel and ingest its chapter text files
    Import {
        /// Novel title
        #[arg(long)]
        title: String,
        /// Genre hint (fantasy, wuxia, historical, urban)
        #[arg(long)]
        genre: Option<String>,
        /// Directory of chapter text files, sorted by filename
        chapters_dir: PathBuf,
    },

    /// Chapter analysis task control
    #[command(subcommand)]
    Analyze(AnalyzeCommands),

    /// Entity dictionary management
    #[command(subcommand)]
    Entity(EntityCommands),

    /// World hierarchy inspection and rebuilding
    #[command(subcommand)]
    Hierarchy(HierarchyCommands),

    /// Export a novel's accumulated facts and world structure to JSON
    Export {
        novel_id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AnalyzeCommands {
    /// Start analyzing a chapter range
    Start {
        novel_id: String,
        #[arg(long, default_value = "1")]
        from: i64,
        #[arg(long)]
        to: i64,
        /// Re-analyze chapters even if already completed
        #[arg(long)]
        force: bool,
    },
    /// Pause the running task for a novel
    Pause { task_id: String },
    /// Resume a paused task
    Resume { task_id: String },
    /// Cancel a task
    Cancel { task_id: String },
    /// Show task status
    Status { task_id: String },
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Run the two-phase entity pre-scan over all ingested chapters
    Rescan { novel_id: String },
    /// List the entity dictionary for a novel
    List { novel_id: String },
}

#[derive(Subcommand)]
pub enum HierarchyCommands {
    /// Show the current resolved hierarchy for a novel
    Show { novel_id: String },
    /// Re-run the hierarchy consolidator from scratch
    Rebuild { novel_id: String },
}

/// Execute a CLI command, dispatching to the appropriate handler.
pub async fn execute(command: &Commands, ctx: &crate::init::AppContext, json: bool) -> anyhow::Result<()> {
    let mode = OutputMode::from_json_flag(json);

    match command {
        Commands::Import {
            title,
            genre,
            chapters_dir,
        } => handlers::ingest::handle_import(ctx, title, genre.as_deref(), chapters_dir, mode).await?,

        Commands::Analyze(cmd) => match cmd {
            AnalyzeCommands::Start {
                novel_id,
                from,
                to,
                force,
            } => handlers::analyze::handle_start(ctx, novel_id, *from, *to, *force, mode).await?,
            AnalyzeCommands::Pause { task_id } => handlers::analyze::handle_pause(ctx, task_id, mode).await?,
            AnalyzeCommands::Resume { task_id } => handlers::analyze::handle_resume(ctx, task_id, mode).await?,
            AnalyzeCommands::Cancel { task_id } => handlers::analyze::handle_cancel(ctx, task_id, mode).await?,
            AnalyzeCommands::Status { task_id } => handlers::analyze::handle_status(ctx, task_id, mode).await?,
        },

        Commands::Entity(cmd) => match cmd {
            EntityCommands::Rescan { novel_id } => handlers::entity::handle_rescan(ctx, novel_id, mode).await?,
            EntityCommands::List { novel_id } => handlers::entity::handle_list(ctx, novel_id, mode).await?,
        },

        Commands::Hierarchy(cmd) => match cmd {
            HierarchyCommands::Show { novel_id } => handlers::hierarchy::handle_show(ctx, novel_id, mode).await?,
            HierarchyCommands::Rebuild { novel_id } => {
                handlers::hierarchy::handle_rebuild(ctx, novel_id, mode).await?
            }
        },

        Commands::Export { novel_id, output } => {
            handlers::export::handle_export(ctx, novel_id, output.as_deref(), mode).await?
        }
    }

    Ok(())
}
