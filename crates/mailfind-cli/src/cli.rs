//! CLI argument parsing and command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mailfind_query::SearchMode;

// ============================================================================
// CLI argument types
// ============================================================================

/// Local lexical, semantic and hybrid search over archived mail.
#[derive(Parser, Debug)]
#[command(name = "mailfind", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "MAILFIND_CONFIG", global = true)]
    pub config: Option<String>,

    /// Path to the store file (overrides `store.path`).
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index messages from a JSON Lines file (one record per line).
    Index {
        /// Input file.
        file: PathBuf,

        /// Index text only; store no vectors.
        #[arg(long)]
        no_embeddings: bool,

        /// Embedding backend selector (overrides `embedding.backend`).
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Search indexed messages.
    Search {
        /// Query text: terms, "phrases", +required, -excluded, OR.
        query: String,

        /// Ranking mode.
        #[arg(short, long, value_enum, default_value_t = ModeArg::Hybrid)]
        mode: ModeArg,

        /// Maximum number of results (defaults to `search.default_limit`).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one message by id.
    Show {
        /// Message id.
        message_id: String,

        /// Print the message as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Search mode as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Lexical,
    Semantic,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lexical => SearchMode::Lexical,
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "embedding.backend").
        key: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
