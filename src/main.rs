use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use orggraph::config::{load_config, CrawlerConfig};
use orggraph::crawler::{DirectoryArtifactSource, LogStatusSink, TriggerCrawler};
use orggraph::errors::Result;
use orggraph::graph::{GraphStore, SqliteGraphStore};
use orggraph::parse::ApexParser;
use orggraph::soql::SoqlParser;

/// Metadata dependency crawler for org source artifacts.
#[derive(Parser)]
#[command(name = "orggraph", about = "Maps Apex triggers and their SOQL references into an org graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a directory of .trigger files into the graph
    Crawl {
        /// Directory containing trigger source files
        dir: PathBuf,
        /// Path to the graph database
        #[arg(long, default_value = "orggraph.db")]
        db: PathBuf,
        /// Organization identifier attached to log events
        #[arg(long, default_value = "local")]
        org: String,
        /// Crawler configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Maximum artifacts in flight (overrides the config file)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Load object and field metadata so lookups can resolve
    Seed {
        /// JSON file describing objects and their fields
        file: PathBuf,
        /// Path to the graph database
        #[arg(long, default_value = "orggraph.db")]
        db: PathBuf,
    },
    /// Show graph statistics
    Stats {
        /// Path to the graph database
        #[arg(long, default_value = "orggraph.db")]
        db: PathBuf,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// One object entry in a seed file.
#[derive(Debug, Deserialize)]
struct SeedObject {
    object: String,
    #[serde(default)]
    fields: Vec<SeedField>,
}

/// One field entry in a seed file.
#[derive(Debug, Deserialize)]
struct SeedField {
    id: String,
    name: String,
    #[serde(default)]
    relationship_name: Option<String>,
    #[serde(default)]
    reference_to: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl {
            dir,
            db,
            org,
            config,
            jobs,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => CrawlerConfig::default(),
            };
            if let Some(jobs) = jobs {
                config.max_in_flight = jobs;
            }

            let store = SqliteGraphStore::initialize(&db)?;
            let source = DirectoryArtifactSource::new(&dir, &org);
            let parser = ApexParser;
            let queries = SoqlParser;
            let status = LogStatusSink;

            let crawler =
                TriggerCrawler::new(&source, &store, &parser, &queries, &status, config);
            let summary = crawler.run().await?;
            println!(
                "Crawled {} of {} triggers: {} edges upserted",
                summary.completed, summary.total, summary.edges_upserted
            );
        }
        Commands::Seed { file, db } => {
            let store = SqliteGraphStore::initialize(&db)?;
            let contents = std::fs::read_to_string(&file)?;
            let objects: Vec<SeedObject> = serde_json::from_str(&contents)?;

            let mut nodes = 0u64;
            for entry in &objects {
                let record = serde_json::json!({ "name": entry.object });
                nodes += store
                    .upsert("CustomObject", "name", &record)
                    .await?
                    .nodes_created;
                for field in &entry.fields {
                    let record = serde_json::json!({
                        "Id": field.id,
                        "name": field.name,
                        "object_name": entry.object,
                        "relationship_name": field.relationship_name,
                        "reference_to": field.reference_to,
                    });
                    nodes += store
                        .upsert("CustomField", "Id", &record)
                        .await?
                        .nodes_created;
                }
            }
            println!("Seeded {} objects: {} new nodes", objects.len(), nodes);
        }
        Commands::Stats { db, json } => {
            let store = SqliteGraphStore::open(&db)?;
            let stats = store.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Nodes: {}", stats.node_count);
                for (node_type, count) in &stats.nodes_by_type {
                    println!("  {node_type}: {count}");
                }
                println!("Edges: {}", stats.edge_count);
                for (category, count) in &stats.edges_by_category {
                    println!("  {category}: {count}");
                }
            }
        }
    }
    Ok(())
}
