//! Thin binary wiring config loading, the indexing manager, and the search
//! surface together (§1: "this crate still ships a working CLI entry
//! point... because a Rust crate with no way to run is not a deliverable").

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use core_types::config::{default_config_path, load_or_create_config};
use core_types::SearchMode as CoreSearchMode;
use indicatif::{ProgressBar, ProgressStyle};
use manager::IndexingManager;

#[derive(Parser, Debug)]
#[command(name = "localsearch", version, about = "Local file-system search engine")]
struct Cli {
    /// Override the config file path (default: the platform data directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Perform a one-shot bulk scan of every monitored path, then exit.
    Scan,

    /// Bulk scan (unless --no-scan), then watch monitored paths until
    /// interrupted.
    Watch {
        #[arg(long)]
        no_scan: bool,
    },

    /// Run a search query against the on-disk indexes.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Hybrid)]
        mode: ModeArg,
        /// Keyword weight used in hybrid mode.
        #[arg(long, default_value_t = 0.6)]
        w_k: f32,
        /// Semantic weight used in hybrid mode.
        #[arg(long, default_value_t = 0.4)]
        w_s: f32,
        /// Search only the filename field.
        #[arg(long)]
        filename: bool,
        #[arg(long)]
        json: bool,
    },

    /// Report aggregate counts from both indexes.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize the on-disk configuration.
    Config {
        #[command(subcommand)]
        sub: ConfigCmd,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    /// Print the effective config path and contents, creating a default file
    /// if none exists yet.
    Show {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Keyword,
    Semantic,
    Hybrid,
}

impl From<ModeArg> for CoreSearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Keyword => CoreSearchMode::Keyword,
            ModeArg::Semantic => CoreSearchMode::Semantic,
            ModeArg::Hybrid => CoreSearchMode::Hybrid,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    manager::init_tracing().ok();
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Config { sub } => run_config(sub, &config_path),
        Commands::Scan => {
            let manager = open_manager(&config_path)?;
            run_with_spinner("Scanning monitored paths...", || manager.start(true))?;
            manager.stop()?;
            println!("{}", style("Bulk scan complete.").green());
            Ok(())
        }
        Commands::Watch { no_scan } => {
            let manager = open_manager(&config_path)?;
            manager.start(!no_scan)?;
            println!(
                "{}",
                style("Watching monitored paths. Press Ctrl+C to stop.").green()
            );
            loop {
                std::thread::sleep(Duration::from_secs(1));
            }
        }
        Commands::Search {
            query,
            limit,
            mode,
            w_k,
            w_s,
            filename,
            json,
        } => {
            let manager = open_manager(&config_path)?;
            let results = if filename {
                manager.search_by_filename(&query, limit)?
            } else {
                manager.search(&query, mode.into(), limit, w_k, w_s)?
            };
            print_results(&results, json)
        }
        Commands::Stats { json } => {
            let manager = open_manager(&config_path)?;
            let stats = manager.stats()?;
            print_stats(&stats, json)
        }
    }
}

/// Run `work` (a blocking call) on the current thread while a spinner ticks
/// on a background thread, so a bulk scan that takes more than an instant
/// doesn't look like a hang.
fn run_with_spinner<F, T>(message: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T, manager::ManagerError>,
{
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}").unwrap());
    spinner.set_message(message.to_string());

    let running = Arc::new(AtomicBool::new(true));
    let ticker_running = Arc::clone(&running);
    let ticker_bar = spinner.clone();
    let ticker = std::thread::spawn(move || {
        while ticker_running.load(Ordering::Relaxed) {
            ticker_bar.tick();
            std::thread::sleep(Duration::from_millis(80));
        }
    });

    let result = work();
    running.store(false, Ordering::Relaxed);
    let _ = ticker.join();
    spinner.finish_and_clear();
    Ok(result?)
}

fn open_manager(config_path: &PathBuf) -> Result<IndexingManager> {
    let config = load_or_create_config(config_path)?;
    Ok(IndexingManager::new(config)?)
}

fn run_config(sub: ConfigCmd, config_path: &PathBuf) -> Result<()> {
    match sub {
        ConfigCmd::Show { json } => {
            let cfg = load_or_create_config(config_path)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "path": config_path, "config": cfg })
                );
            } else {
                println!("{}", style("Config path:").green());
                println!("  {}", config_path.display());
                println!("{}", style("Config:").green());
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
            Ok(())
        }
    }
}

fn print_results(results: &[core_types::SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    println!("{}", style(format!("{} result(s):", results.len())).green());
    for (i, hit) in results.iter().enumerate() {
        println!(
            "{:3}. {:<40} score={:.3} type={} path={}",
            i + 1,
            hit.filename,
            hit.combined_score,
            hit.search_type,
            hit.path.display(),
        );
        if let Some(text) = &hit.chunk_text {
            println!("     {}", style(text).dim());
        }
    }
    Ok(())
}

fn print_stats(stats: &manager::ManagerStats, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "keyword": {
                    "num_docs": stats.keyword.num_docs,
                    "total_stored_size": stats.keyword.total_stored_size,
                    "docs_by_file_type": stats.keyword.docs_by_file_type,
                    "index_dir": stats.keyword.index_dir,
                },
                "vector": stats.vector.as_ref().map(|v| serde_json::json!({
                    "total_chunks": v.total_chunks,
                    "unique_source_paths": v.unique_source_paths,
                    "embedding_model": v.embedding_model,
                    "file_type_counts": v.file_type_counts,
                })),
            })
        );
        return Ok(());
    }

    println!("{}", style("Keyword index:").green());
    println!("  documents:   {}", stats.keyword.num_docs);
    println!("  stored size: {} bytes", stats.keyword.total_stored_size);
    println!("  index dir:   {}", stats.keyword.index_dir.display());
    for (file_type, count) in &stats.keyword.docs_by_file_type {
        println!("    {file_type}: {count}");
    }

    match &stats.vector {
        Some(v) => {
            println!("{}", style("Vector index:").green());
            println!("  chunks:          {}", v.total_chunks);
            println!("  unique sources:  {}", v.unique_source_paths);
            println!("  embedding model: {}", v.embedding_model);
        }
        None => println!("{}", style("Vector index: unavailable for this session").yellow()),
    }
    Ok(())
}
