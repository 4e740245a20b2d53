//! relidx - release index maintainer CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relidx_cli::cmd;
use relidx_cli::config::Config;
use relidx_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON and workflow commands.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::discover(cli.config.as_deref())?;
    let repository = cli.repository;

    match cli.command {
        Commands::Release { event } => cmd::release::release(&repository, &event, &config),
        Commands::Translate { event } => cmd::translate::translate(&event, &config),
        Commands::Resolve {
            url,
            tag_prefix,
            tokens,
        } => cmd::resolve::resolve(&url, tag_prefix.as_deref(), &tokens, &config).await,
        Commands::Info { url, tokens } => cmd::info::info(&url, &tokens, &config).await,
        Commands::Sync {
            urls,
            tag_prefix,
            name,
            tokens,
        } => {
            cmd::sync::sync(
                &repository,
                &urls,
                tag_prefix.as_deref(),
                name.as_deref(),
                &tokens,
                &config,
            )
            .await
        }
    }
}
