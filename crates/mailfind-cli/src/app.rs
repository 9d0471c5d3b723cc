//! The mailfind application: logging, store wiring and command dispatch.

use std::path::Path;

use mailfind_core::{Error, MailStore, RawMessage, Result};
use mailfind_query::{IngestOptions, IngestReport, Indexer, QueryEngine, QueryResult, SearchMode};
use mailfind_vector::{BackendSelection, select_provider};
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};
use crate::config::MailfindConfig;
use crate::config_handlers;

/// Highlight markers used when printing snippets to a terminal.
const HIGHLIGHT_OPEN: &str = "**";
const HIGHLIGHT_CLOSE: &str = "**";

/// Initialise tracing-based logging.
///
/// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
/// Library crates log through `log`; the subscriber picks those records up.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Ignore error if a subscriber is already set (e.g. in tests).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse, configure and run one command.
pub async fn run(args: CliArgs) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    // Config commands must work even when the config file is broken.
    if let Command::Config(config_cmd) = args.command {
        return config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command);
    }

    let mut config = MailfindConfig::load(args.config.as_deref())?;
    if let Some(store) = args.store {
        config.store.path = Some(store);
    }
    App::new(config)
        .with_config_path(args.config)
        .execute(args.command)
        .await
}

// ============================================================================
// App
// ============================================================================

/// A loaded configuration plus the commands that use it.
pub struct App {
    config: MailfindConfig,
    config_path: Option<String>,
}

impl App {
    pub fn new(config: MailfindConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Remember the `--config` path the configuration came from.
    pub fn with_config_path(mut self, config_path: Option<String>) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn config(&self) -> &MailfindConfig {
        &self.config
    }

    async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Index {
                file,
                no_embeddings,
                backend,
            } => {
                let report = self.index(&file, !no_embeddings, backend).await?;
                print_report(&report);
                Ok(())
            }
            Command::Search {
                query,
                mode,
                limit,
                json,
            } => {
                let results = self.search(&query, mode.into(), limit).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                } else {
                    print_results(&results);
                }
                Ok(())
            }
            Command::Show { message_id, json } => {
                let message = self.open_store().and_then(|store| {
                    QueryEngine::new(store, self.config.search.clone()).show(&message_id)
                })?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&message)?);
                } else {
                    print_message(&message);
                }
                Ok(())
            }
            Command::Config(config_cmd) => {
                config_handlers::handle_config_command(self.config_path.as_deref(), config_cmd.command)
            }
        }
    }

    /// Index a JSON Lines file of raw message records.
    pub async fn index(
        &self,
        file: &Path,
        generate_embeddings: bool,
        backend: Option<String>,
    ) -> Result<IngestReport> {
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| Error::io_with_path(e, file))?;
        let records = parse_jsonl(&content);

        let mut embedding = self.config.embedding.clone();
        if let Some(backend) = backend {
            embedding.backend = backend;
        }
        let selection = if generate_embeddings {
            let selection = select_provider(&embedding)?;
            report_selection(&selection);
            selection
        } else {
            BackendSelection::disabled()
        };
        let options = IngestOptions {
            generate_embeddings: generate_embeddings && selection.provider.is_some(),
            backend_override: None,
        };

        let store = MailStore::create(self.config.store.resolve_path()?)?;
        let indexer = Indexer::new(store, self.config.search.clone(), &embedding)
            .with_selection(&selection);
        indexer.ingest_records(records, options).await
    }

    /// Search the store.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: Option<usize>,
    ) -> Result<Vec<QueryResult>> {
        let selection = match mode {
            SearchMode::Lexical => BackendSelection::disabled(),
            SearchMode::Semantic | SearchMode::Hybrid => {
                let selection = select_provider(&self.config.embedding)?;
                report_selection(&selection);
                selection
            }
        };

        let engine = QueryEngine::new(self.open_store()?, self.config.search.clone())
            .with_selection(&selection)
            .with_hybrid(self.config.hybrid.clone())
            .with_timeout(self.config.embedding.timeout());
        let limit = limit.unwrap_or(self.config.search.default_limit);
        engine.search(query, mode, limit).await
    }

    /// Queries only read, so they never contend with each other for the
    /// file; they do wait out a running ingest (`StoreBusy`).
    fn open_store(&self) -> Result<MailStore> {
        MailStore::open_read_only(self.config.store.resolve_path()?)
    }
}

/// Parse JSON Lines; blank lines are ignored, bad lines become errors
/// that the indexer records as skipped.
fn parse_jsonl(content: &str) -> Vec<Result<RawMessage>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<RawMessage>(line)
                .map_err(|e| Error::invalid_data(format!("line {}: {e}", index + 1)))
        })
        .collect()
}

fn report_selection(selection: &BackendSelection) {
    match (&selection.fallback, selection.name()) {
        (Some(reason), Some(name)) => {
            tracing::warn!("Embedding backend fell back to {name}: {reason}");
        }
        (None, Some(name)) => tracing::info!("Embedding backend: {name}"),
        (_, None) => tracing::info!("Embeddings disabled"),
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_report(report: &IngestReport) {
    println!(
        "Indexed {} messages ({} new, {} updated), {} skipped",
        report.indexed,
        report.inserted(),
        report.updated,
        report.skipped
    );
    if let Some(backend) = &report.backend {
        println!("Embedding backend: {backend}");
    }
    for skip in &report.skip_reasons {
        println!(
            "  skipped #{} ({}): {}",
            skip.position,
            skip.message_id.as_deref().unwrap_or("no id"),
            skip.reason
        );
    }
}

fn print_results(results: &[QueryResult]) {
    if results.is_empty() {
        println!("No matches.");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        println!("{}. {} [{:.4}]", rank + 1, result.subject, result.fused_score);
        println!("   From: {}", result.sender);
        if let Some(date) = result.date {
            println!("   Date: {}", date.to_rfc2822());
        }
        println!("   Id:   {}", result.message_id);
        println!(
            "   {}",
            result.snippet.render(HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE)
        );
    }
}

fn print_message(message: &mailfind_core::Message) {
    println!("Id:      {}", message.message_id);
    println!("Subject: {}", message.subject);
    println!("From:    {}", message.sender);
    if !message.recipients.is_empty() {
        println!("To:      {}", message.recipients.join(", "));
    }
    if let Some(date) = message.date {
        println!("Date:    {}", date.to_rfc2822());
    }
    if let Some(locator) = &message.source_locator {
        println!("Source:  {locator}");
    }
    println!();
    println!("{}", message.body);
}

// ============================================================================
// Tests
// ============================================================================
