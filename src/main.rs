use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use cocosearch::search::HybridMode;
use cocosearch::{EmbedderConfig, Engine, EngineConfig, IndexOptions, SearchOptions, StoreConfig};

#[derive(Debug, Parser)]
#[command(name = "cocosearch")]
#[command(version)]
#[command(about = "Local-first hybrid code search (pgvector + tsvector, fused by RRF)")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index (or re-index) a source tree into a named index
    Index {
        /// Index name (lowercase letters, digits, underscores)
        name: String,
        /// Source directory to index
        path: PathBuf,
        /// Include globs (repeatable), e.g. --include 'src/**/*.py'
        #[arg(long)]
        include: Vec<String>,
        /// Exclude globs (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
        /// Do not honor .gitignore
        #[arg(long)]
        no_gitignore: bool,
        /// Re-embed files even when their content hash is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Search an index
    Search {
        name: String,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        /// Restrict to languages (aliases ok: terraform, sh, ...)
        #[arg(long)]
        language: Vec<String>,
        /// Restrict to symbol types: function, class, method, interface
        #[arg(long)]
        symbol_type: Vec<String>,
        /// Case-insensitive glob over symbol names, e.g. 'get_*'
        #[arg(long)]
        symbol_name: Option<String>,
        /// Hybrid mode: auto, on or off
        #[arg(long, default_value = "auto")]
        hybrid: String,
        /// Disable smart context expansion
        #[arg(long)]
        no_smart_context: bool,
        /// Explicit context lines before each match
        #[arg(long)]
        context_before: Option<usize>,
        /// Explicit context lines after each match
        #[arg(long)]
        context_after: Option<usize>,
        /// Skip the query cache entirely
        #[arg(long)]
        no_cache: bool,
        /// Emit JSON instead of the text listing
        #[arg(long)]
        json: bool,
    },

    /// Search with per-stage timings and intermediate counts
    Analyze {
        name: String,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "auto")]
        hybrid: String,
    },

    /// Show statistics for one index, or all of them
    Stats { name: Option<String> },

    /// List registered indexes
    List,

    /// Drop an index (both tables, atomically)
    Drop { name: String },
}

fn parse_hybrid(s: &str) -> Result<HybridMode> {
    match s {
        "auto" => Ok(HybridMode::Auto),
        "on" => Ok(HybridMode::On),
        "off" => Ok(HybridMode::Off),
        other => bail!("invalid hybrid mode '{other}' (expected auto, on or off)"),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}")
        .unwrap()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let connect_spinner = ProgressBar::new_spinner();
    connect_spinner.set_style(spinner_style());
    connect_spinner.set_message("connecting...");
    connect_spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    let engine = Engine::connect(EngineConfig::default(), &StoreConfig::from_env(), EmbedderConfig::from_env()).await?;
    connect_spinner.finish_and_clear();

    match cli.cmd {
        Command::Index {
            name,
            path,
            include,
            exclude,
            no_gitignore,
            force,
        } => {
            let opts = IndexOptions {
                include,
                exclude,
                no_gitignore,
                force,
            };

            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                    .unwrap()
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(80));

            let (report, stats) = engine
                .create_or_update_index(&name, &path, &opts, |rel, done, total| {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                    bar.set_message(rel.to_string());
                })
                .await?;
            bar.finish_and_clear();

            println!(
                "indexed {} file(s) ({} chunk(s)), {} unchanged, {} skipped, {} deleted",
                report.files_indexed,
                report.chunks_written,
                report.files_unchanged,
                report.files_skipped,
                report.files_deleted
            );
            println!(
                "index '{}': {} files / {} chunks total",
                stats.name, stats.total_files, stats.total_chunks
            );
        }

        Command::Search {
            name,
            query,
            limit,
            min_score,
            language,
            symbol_type,
            symbol_name,
            hybrid,
            no_smart_context,
            context_before,
            context_after,
            no_cache,
            json,
        } => {
            let opts = SearchOptions {
                limit,
                min_score,
                language_filter: language,
                symbol_type_filter: symbol_type,
                symbol_name_filter: symbol_name,
                use_hybrid: parse_hybrid(&hybrid)?,
                smart_context: !no_smart_context,
                context_before,
                context_after,
                bypass_cache: no_cache,
            };

            let results = engine.search(&name, &query, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("no results");
            } else {
                for (i, r) in results.iter().enumerate() {
                    let symbol = if r.symbol_name.is_empty() {
                        String::new()
                    } else {
                        format!("  [{} {}]", r.symbol_type, r.symbol_name)
                    };
                    println!(
                        "{:2}. {}:{}-{}  score={:.4}  {:?}{}",
                        i + 1,
                        r.file_path,
                        r.line_start,
                        r.line_end,
                        r.score,
                        r.match_type,
                        symbol
                    );
                    for line in r.content.lines() {
                        println!("      {line}");
                    }
                    println!();
                }
            }
        }

        Command::Analyze { name, query, limit, hybrid } => {
            let opts = SearchOptions {
                limit,
                use_hybrid: parse_hybrid(&hybrid)?,
                ..Default::default()
            };
            let report = engine.analyze(&name, &query, &opts).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Stats { name } => {
            let stats = engine.stats(name.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::List => {
            for record in engine.list_indexes().await? {
                println!("{}\t{}\t(updated {})", record.name, record.source_path, record.updated_at);
            }
        }

        Command::Drop { name } => {
            engine.drop_index(&name).await?;
            println!("dropped index '{name}'");
        }
    }

    Ok(())
}
