// SPDX-License-Identifier: MIT OR Apache-2.0

//! simscan - Local document similarity scanner
//!
//! Indexes documents into a local repository and checks new texts against
//! it, combining embedding retrieval with exact character alignment.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

use commands::Context;

fn main() -> Result<()> {
    // Initialize tracing with SIMSCAN_LOG env var (e.g., SIMSCAN_LOG=debug simscan scan essay.txt)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("SIMSCAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let ctx = Context::new(&cli)?;

    match cli.command {
        Commands::Index {
            path,
            id,
            replace,
            scope,
        } => {
            let scope: Option<simscan::store::Scope> = scope.into();
            let options = commands::index::IndexOptions {
                id,
                scope: scope.unwrap_or_default(),
                replace,
            };
            commands::index::run(&ctx, &path, options)?;
        }
        Commands::Scan {
            path,
            top_k,
            threshold,
            min_match,
            highlight,
            scope,
        } => {
            let args = commands::scan::ScanArgs {
                top_k,
                threshold,
                min_match,
                highlight,
                scope: scope.into(),
            };
            commands::scan::run(&ctx, &path, args)?;
        }
        Commands::Compare {
            first,
            second,
            min_match,
            highlight,
        } => {
            commands::compare::run(&ctx, &first, &second, min_match, highlight)?;
        }
        Commands::List { scope } => {
            commands::documents::list(&ctx, scope.into())?;
        }
        Commands::Delete { id } => {
            commands::documents::delete(&ctx, &id)?;
        }
        Commands::Stats => {
            commands::documents::stats(&ctx)?;
        }
        Commands::Reindex => {
            commands::documents::reindex(&ctx)?;
        }
        Commands::Watch {
            path,
            debounce,
            scope,
        } => {
            commands::watch::run(&ctx, &path, debounce, scope.into())?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "simscan", &mut std::io::stdout());
        }
    }

    Ok(())
}
