//! loregraph - turns raw chapters into a consolidated knowledge graph
//!
//! Usage:
//!   loregraph import --title "..." --genre fantasy ./chapters
//!   loregraph analyze start <novel_id> --to 50
//!   loregraph hierarchy show <novel_id>
//!   loregraph --help                 Show all commands

use anyhow::Result;
use clap::Parser;

use loregraph::cli::{execute, Cli};
use loregraph::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("loregraph=info".parse()?),
        )
        .init();

    let ctx = AppContext::new(cli.data_path.clone()).await?;
    execute(&cli.command, &ctx, cli.json).await?;

    Ok(())
}
