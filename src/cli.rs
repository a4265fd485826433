// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// simscan - Local document similarity scanner
///
/// Indexes a repository of documents and reports how much of a submitted
/// text overlaps with it, highlighting the shared passages.
#[derive(Parser, Debug)]
#[command(name = "simscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Directory holding the document store and vector index
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Time budget per request in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Repository partition selection
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Personal repository of this owner
    #[arg(long, value_name = "ID", conflicts_with = "university")]
    pub owner: Option<i64>,

    /// Shared university repository
    #[arg(long)]
    pub university: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a file, or every supported file under a directory, to the repository
    #[command(alias = "i")]
    Index {
        /// File or directory to index
        path: PathBuf,

        /// Explicit document id (single file only)
        #[arg(long)]
        id: Option<String>,

        /// Replace documents already indexed under the same file name
        #[arg(long)]
        replace: bool,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Check a file against the repository
    #[command(alias = "s")]
    Scan {
        /// File to check
        path: PathBuf,

        /// Neighbors retrieved per chunk
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Cosine threshold for a hit to count (0.0-1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Minimum highlighted run in characters
        #[arg(long, value_name = "CHARS")]
        min_match: Option<usize>,

        /// Print the checked text with shared passages highlighted
        #[arg(long)]
        highlight: bool,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Report how much of SECOND is found verbatim in FIRST
    Compare {
        /// Reference file
        first: PathBuf,

        /// Checked file
        second: PathBuf,

        /// Minimum highlighted run in characters
        #[arg(long, value_name = "CHARS")]
        min_match: Option<usize>,

        /// Print the checked text with shared passages highlighted
        #[arg(long)]
        highlight: bool,
    },

    /// List indexed documents
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Remove a document from the repository
    #[command(alias = "rm")]
    Delete {
        /// Document id
        id: String,
    },

    /// Show repository statistics
    Stats,

    /// Rebuild the vector index from the document store
    Reindex,

    /// Watch a directory and index files as they appear
    Watch {
        /// Directory to watch
        path: PathBuf,

        /// Debounce interval in seconds
        #[arg(short, long, default_value = "2")]
        debounce: u64,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scan_with_scope() {
        let cli = Cli::try_parse_from([
            "simscan", "--format", "json", "scan", "essay.txt", "-k", "3", "--owner", "7",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Scan { top_k, scope, .. } => {
                assert_eq!(top_k, Some(3));
                assert_eq!(scope.owner, Some(7));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_conflicting_scopes() {
        let result =
            Cli::try_parse_from(["simscan", "list", "--owner", "1", "--university"]);
        assert!(result.is_err());
    }
}
