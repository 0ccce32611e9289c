//! Trendline CLI, driven by an external scheduler.
//!
//! Usage:
//!   trendline ingest <signals.jsonl> [--config path] [--db path]
//!   trendline consolidate [--threshold t]
//!   trendline feed [--days n] [--window n] [--limit n] [--json]
//!   trendline stats
//!   trendline resolve <cluster-id>

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};
use trendline::embedding::embed_signals;
use trendline::{
    ClusterId, ClusterRepository, EmbeddedSignal, EngineConfig, InMemoryVectorIndex, JsonFileStore,
    OpenStore, Pipeline, Resolution, Signal, SqliteStore, StorageBackend, VectorIndex,
};

#[derive(Parser)]
#[command(name = "trendline", version, about = "Incremental topic clustering for signal streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database or JSON store path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a batch of signals read from a JSON Lines file
    Ingest {
        /// One signal per line; lines may carry a precomputed `embedding`
        path: PathBuf,
        /// Intra-batch similarity threshold
        #[arg(long)]
        intra_threshold: Option<f32>,
        /// Batch-to-population similarity threshold
        #[arg(long)]
        evolution_threshold: Option<f32>,
        /// Drop signals without enough similar history
        #[arg(long)]
        gate: bool,
    },
    /// Merge clusters that have drifted into similarity
    Consolidate {
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print the ranked emerging-trends feed
    Feed {
        /// Recent window in days
        #[arg(long)]
        days: Option<u32>,
        /// Only show signals from the last n days
        #[arg(long)]
        window: Option<u32>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Summarize the cluster population
    Stats,
    /// Show which cluster a (possibly consolidated) id points to now
    Resolve { cluster_id: String },
}

/// One JSON Lines record
#[derive(Deserialize)]
struct SignalLine {
    #[serde(flatten)]
    signal: Signal,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Get the default database path (~/.local/share/trendline/trendline.db)
fn default_db_path(backend: StorageBackend) -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let dir = data_dir.join("trendline");
    std::fs::create_dir_all(&dir).ok();
    match backend {
        StorageBackend::Sqlite => dir.join("trendline.db"),
        StorageBackend::Json => dir.join("candidates.json"),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

fn open_pipeline(config: EngineConfig, db: Option<PathBuf>) -> Result<Pipeline, String> {
    let backend = config.storage.backend;
    let path = db
        .or_else(|| config.storage.path.clone())
        .unwrap_or_else(|| default_db_path(backend));

    let (repository, index): (Arc<dyn ClusterRepository>, Arc<dyn VectorIndex>) = match backend {
        StorageBackend::Sqlite => {
            let store = Arc::new(
                SqliteStore::open(&path).map_err(|e| format!("Failed to open database: {}", e))?,
            );
            (store.clone() as Arc<dyn ClusterRepository>, store as Arc<dyn VectorIndex>)
        }
        StorageBackend::Json => {
            if config.persistence.gate_batches {
                warn!("json backend keeps no signal history; the persistence gate sees only this run");
            }
            (
                Arc::new(JsonFileStore::new(path)) as Arc<dyn ClusterRepository>,
                Arc::new(InMemoryVectorIndex::new()) as Arc<dyn VectorIndex>,
            )
        }
    };

    let pipeline = Pipeline::new(repository, index, config).map_err(|e| e.to_string())?;
    Ok(attach_embedder(pipeline))
}

#[cfg(feature = "embeddings")]
fn attach_embedder(pipeline: Pipeline) -> Pipeline {
    match trendline::FastEmbedEmbedder::default_model() {
        Ok(embedder) => pipeline.with_embedder(Arc::new(embedder)),
        Err(e) => {
            warn!(error = %e, "embedding model unavailable; only precomputed embeddings accepted");
            pipeline
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn attach_embedder(pipeline: Pipeline) -> Pipeline {
    pipeline
}

fn read_signal_lines(path: &Path) -> Result<Vec<SignalLine>, String> {
    let file = File::open(path).map_err(|e| format!("cannot open '{}': {}", path.display(), e))?;
    let mut lines = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SignalLine = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))?;
        lines.push(record);
    }
    Ok(lines)
}

fn cmd_ingest(pipeline: &Pipeline, path: &Path) -> Result<(), String> {
    let lines = read_signal_lines(path)?;

    let mut items = Vec::with_capacity(lines.len());
    let mut raw = Vec::new();
    for line in lines {
        match line.embedding {
            Some(embedding) => items.push(EmbeddedSignal::new(line.signal, embedding)),
            None => raw.push(line.signal),
        }
    }

    if !raw.is_empty() {
        let embedded = match pipeline.embedder() {
            Some(embedder) => embed_signals(embedder, raw).map_err(|e| e.to_string())?,
            None => {
                return Err(format!(
                    "{} signals have no embedding and no embedding backend is available",
                    raw.len()
                ))
            }
        };
        items.extend(embedded);
    }

    let report = pipeline
        .ingest_embedded(items, Utc::now())
        .map_err(|e| e.to_string())?;
    println!(
        "Ingested {} signals: {} batch clusters, {} merged, {} created, {} duplicates, {} gated out, {} excluded",
        report.received,
        report.batch_clusters,
        report.merged,
        report.created,
        report.duplicates.len(),
        report.gated_out.len(),
        report.excluded.len()
    );
    println!("Population: {} clusters", report.population);
    Ok(())
}

fn cmd_consolidate(pipeline: &Pipeline) -> Result<(), String> {
    let report = pipeline.consolidate(Utc::now()).map_err(|e| e.to_string())?;
    println!("Consolidated {} clusters into {}", report.before, report.after);
    for (alias, survivor) in &report.merged {
        println!("  {} -> {}", alias, survivor);
    }
    Ok(())
}

fn cmd_feed(pipeline: &Pipeline, window: Option<u32>, limit: usize, json: bool) -> Result<(), String> {
    let now = Utc::now();
    let mut feed = match window {
        Some(days) => {
            let bounds = pipeline.window_bounds(now).map_err(|e| e.to_string())?;
            let clamped = days.clamp(bounds.min_days, bounds.max_days);
            if clamped != days {
                warn!(requested = days, window = clamped, "time window clamped to population history");
            }
            pipeline.feed_within(clamped, now)
        }
        None => pipeline.feed(now),
    }
    .map_err(|e| e.to_string())?;
    feed.truncate(limit);

    if json {
        let out = serde_json::to_string_pretty(&feed).map_err(|e| e.to_string())?;
        println!("{}", out);
        return Ok(());
    }
    if feed.is_empty() {
        println!("No clusters yet.");
        return Ok(());
    }
    println!("{:<36}  {:<8}  {:>7}  {:>6}  {}", "CLUSTER", "LEVEL", "SIGNALS", "GROWTH", "TITLE");
    println!("{}", "-".repeat(100));
    for item in &feed {
        println!(
            "{:<36}  {:<8}  {:>7}  {:>6.2}  {}",
            item.cluster_id, item.emergence_level, item.signal_count, item.growth_ratio,
            item.representative_title
        );
        println!("{:<36}  {}", "", item.explanation);
    }
    Ok(())
}

fn cmd_stats(pipeline: &Pipeline) -> Result<(), String> {
    let stats = pipeline.stats(Utc::now()).map_err(|e| e.to_string())?;
    println!("Clusters: {}", stats.clusters);
    println!("Signals:  {}", stats.signals);
    println!("Largest:  {}", stats.largest);
    println!(
        "Levels:   {} rapid, {} stable, {} dormant",
        stats.rapid, stats.stable, stats.dormant
    );
    Ok(())
}

fn cmd_resolve(pipeline: &Pipeline, id: &str) -> Result<(), String> {
    let id = ClusterId::from(id);
    match pipeline.resolve(&id).map_err(|e| e.to_string())? {
        Resolution::Current(id) => println!("{} is current", id),
        Resolution::Aliased(survivor) => println!("{} was merged into {}", id, survivor),
        Resolution::Unknown => return Err(format!("unknown cluster id '{}'", id)),
    }
    Ok(())
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Commands::Ingest {
            intra_threshold,
            evolution_threshold,
            gate,
            ..
        } => {
            if let Some(t) = intra_threshold {
                config.clustering.intra_batch_threshold = *t;
            }
            if let Some(t) = evolution_threshold {
                config.clustering.evolution_threshold = *t;
            }
            if *gate {
                config.persistence.gate_batches = true;
            }
        }
        Commands::Consolidate { threshold: Some(t) } => {
            config.clustering.consolidation_threshold = *t;
        }
        Commands::Feed { days: Some(d), .. } => {
            config.emergence.recent_days = *d;
        }
        _ => {}
    }

    let pipeline = match open_pipeline(config, cli.db) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Ingest { path, .. } => cmd_ingest(&pipeline, path),
        Commands::Consolidate { .. } => cmd_consolidate(&pipeline),
        Commands::Feed {
            window,
            limit,
            json,
            ..
        } => cmd_feed(&pipeline, *window, *limit, *json),
        Commands::Stats => cmd_stats(&pipeline),
        Commands::Resolve { cluster_id } => cmd_resolve(&pipeline, cluster_id),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
