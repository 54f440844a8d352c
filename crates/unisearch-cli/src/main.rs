//! Unisearch CLI
//!
//! Index documents into, remove them from, and search a configured engine.

#![forbid(unsafe_code)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(args.config.as_deref())?;
    let engine = unisearch_engines::create_engine(&config, &args.index)?;
    tracing::debug!(backend = %config.backend, index = %args.index, "Engine ready");

    match args.command {
        Command::Index {
            doc_type,
            refresh,
            file,
        } => commands::index(engine.as_ref(), &doc_type, &file, refresh).await,
        Command::Remove {
            doc_type,
            refresh,
            id,
        } => commands::remove(engine.as_ref(), &doc_type, &id, refresh).await,
        Command::Search(search) => {
            commands::search(engine.as_ref(), &search, config.default_page_size).await
        }
    }
}
