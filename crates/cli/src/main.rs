//! Shopfront CLI — run and replay catalog listing sessions from the terminal.
//!
//! Drives `shopfront-core` against an in-memory catalog loaded from JSON.

mod script;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shopfront_core::{
    load_config, load_config_file, EngineConfig, FetchFailure, InMemoryCatalog, ListingEngine, QuerySnapshot,
    ResultPage, SearchBox,
};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info};

use script::Script;

/// Shopfront CLI — reactive catalog listing sessions.
#[derive(Parser)]
#[command(name = "shopfront", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .shopfront.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one listing query and print the resulting page
    Search {
        /// Search term (empty matches everything)
        #[arg(default_value = "")]
        term: String,

        /// Catalog JSON file (array of products)
        #[arg(long)]
        catalog: PathBuf,

        /// Show only this category
        #[arg(long)]
        category: Option<i64>,

        /// Sort as "field,dir"
        #[arg(long)]
        sort: Option<String>,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: usize,

        /// Page size (must be one of the configured sizes)
        #[arg(long)]
        page_size: Option<usize>,

        /// Simulated backend latency
        #[arg(long, default_value = "0")]
        latency_ms: u64,
    },
    /// Replay a TOML script of timed listing events
    Replay {
        /// Script file
        script: PathBuf,

        /// Catalog JSON file (array of products)
        #[arg(long)]
        catalog: PathBuf,

        /// Simulated backend latency
        #[arg(long, default_value = "50")]
        latency_ms: u64,

        /// How long to keep listening after the last event
        #[arg(long, default_value = "1000")]
        linger_ms: u64,
    },
    /// Show the effective configuration
    CheckConfig {
        /// Config file (default: .shopfront.toml in the current directory)
        path: Option<PathBuf>,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

enum Outcome {
    Page(ResultPage),
    Failed(FetchFailure),
}

fn resolve_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config_file(path)?),
        None => Ok(load_config(&std::env::current_dir()?)),
    }
}

fn print_page(page: &ResultPage, json: bool) -> CliResult {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }
    if page.items.is_empty() {
        eprintln!("No products on this page");
    }
    for p in &page.items {
        println!("{:>6}  {:<40} {:>10.2}  cat {}", p.id, p.name, p.price, p.category_id);
    }
    eprintln!("\n{} shown, {} total", page.items.len(), page.total);
    Ok(())
}

// Current-thread runtime: nothing spawned runs until we first await, so setup
// changes made before that point supersede the engine's initial fetch.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shopfront=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Search { term, catalog, category, sort, page, page_size, latency_ms } => {
            run_search(cli.config.as_deref(), &catalog, term, category, sort, page, page_size, latency_ms, json).await
        }
        Commands::Replay { script, catalog, latency_ms, linger_ms } => {
            run_replay(cli.config.as_deref(), &catalog, &script, latency_ms, linger_ms, json).await
        }
        Commands::CheckConfig { path } => check_config(path.as_deref().or(cli.config.as_deref()), json),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    config_path: Option<&Path>,
    catalog: &Path,
    term: String,
    category: Option<i64>,
    sort: Option<String>,
    page: usize,
    page_size: Option<usize>,
    latency_ms: u64,
    json: bool,
) -> CliResult {
    let config = resolve_config(config_path)?;
    let backend = InMemoryCatalog::from_json_file(catalog)?.with_latency(Duration::from_millis(latency_ms));
    let page_size = page_size.unwrap_or_else(|| config.default_page_size());
    let engine = ListingEngine::new(config, Arc::new(backend))?;

    engine.update(|u| {
        u.set_search_term(term.trim());
        u.set_category(category);
        if let Some(sort) = &sort {
            u.set_sort(sort.parse()?)?;
        }
        u.set_page(page, page_size)
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let page_tx = tx.clone();
    let _results = engine.results().subscribe(move |p: &ResultPage| {
        let _ = page_tx.send(Outcome::Page(p.clone()));
    });
    let _failures = engine.failures().subscribe(move |f: &FetchFailure| {
        let _ = tx.send(Outcome::Failed(f.clone()));
    });

    let outcome = rx.recv().await;
    engine.dispose();
    match outcome {
        Some(Outcome::Page(page)) => print_page(&page, json),
        Some(Outcome::Failed(failure)) => Err(failure.error.into()),
        None => Err("Session ended without a result".into()),
    }
}

async fn run_replay(
    config_path: Option<&Path>,
    catalog: &Path,
    script_path: &Path,
    latency_ms: u64,
    linger_ms: u64,
    json: bool,
) -> CliResult {
    let config = resolve_config(config_path)?;
    let script = Script::load(script_path)?;
    let backend = InMemoryCatalog::from_json_file(catalog)?.with_latency(Duration::from_millis(latency_ms));
    let search = SearchBox::new(config.debounce());
    let engine = Arc::new(ListingEngine::new(config, Arc::new(backend))?);
    let _link = search.connect(&engine);

    let start = Instant::now();
    let elapsed = move || start.elapsed().as_millis();

    let _snapshots = engine.snapshots().subscribe(move |s: &QuerySnapshot| {
        if json {
            println!("{}", serde_json::json!({ "t": elapsed(), "snapshot": s }));
        } else {
            println!(
                "[{:>5}ms] snapshot #{} term={:?} category={:?} sort={} page={}x{}",
                elapsed(),
                s.seq,
                s.filter.search_term,
                s.filter.category_id,
                s.filter.sort,
                s.pagination.page_index,
                s.pagination.page_size
            );
        }
    });
    let _loading = engine.loading().subscribe(move |busy: &bool| {
        if json {
            println!("{}", serde_json::json!({ "t": elapsed(), "loading": busy }));
        } else {
            println!("[{:>5}ms] loading={busy}", elapsed());
        }
    });
    let _results = engine.results().subscribe(move |page: &ResultPage| {
        if json {
            println!("{}", serde_json::json!({ "t": elapsed(), "result": page }));
        } else {
            let names: Vec<&str> = page.items.iter().map(|p| p.name.as_str()).collect();
            println!("[{:>5}ms] result total={} items={names:?}", elapsed(), page.total);
        }
    });
    let _failures = engine.failures().subscribe(move |f: &FetchFailure| {
        if json {
            println!("{}", serde_json::json!({ "t": elapsed(), "failure": { "seq": f.seq, "error": f.error.to_string() } }));
        } else {
            println!("[{:>5}ms] failure #{}: {}", elapsed(), f.seq, f.error);
        }
    });

    info!(events = script.events.len(), duration_ms = script.duration_ms(), "Replaying script");

    let replay = async {
        for event in &script.events {
            sleep_until(start + Duration::from_millis(event.at_ms)).await;
            if let Err(e) = event.action.apply(&engine, &search) {
                error!(at_ms = event.at_ms, error = %e, "Event rejected");
            }
        }
        sleep_until(start + Duration::from_millis(script.duration_ms() + linger_ms)).await;
    };

    tokio::select! {
        _ = replay => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    search.dispose();
    engine.dispose();
    if !json {
        let stats = engine.stats();
        eprintln!(
            "\n{} dispatched, {} applied, {} failed, {} discarded, {} aborted",
            stats.dispatched, stats.applied, stats.failed, stats.discarded, stats.aborted
        );
    }
    Ok(())
}

fn check_config(path: Option<&Path>, json: bool) -> CliResult {
    let config = resolve_config(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("debounce_ms          = {}", config.debounce_ms);
        println!("dispatch_debounce_ms = {}", config.dispatch_debounce_ms);
        println!("page_sizes           = {:?}", config.page_sizes);
        println!("default_sort         = \"{}\"", config.default_sort);
        match config.fetch_timeout_ms {
            Some(ms) => println!("fetch_timeout_ms     = {ms}"),
            None => println!("fetch_timeout_ms     = (none)"),
        }
        println!("abort_superseded     = {}", config.abort_superseded);
        println!("local.category_filter = {}", config.local_category_filter);
        println!("local.sort            = {}", config.local_sort);
    }
    Ok(())
}
