use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphreader::cache::EmbeddingCache;
use graphreader::db::{migrate, Db};
use graphreader::embeddings::{embed_missing_key_elements, OpenAIEmbedder};
use graphreader::graph::{graph_stats, import_graph, reset_graph, Graph, SqliteGraphStore};
use graphreader::oracle::ChatOracle;
use graphreader::{Config, GraphReader, TraversalStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "graphreader", version)]
#[command(about = "Answer questions by reading a knowledge graph with an LLM")]
struct Cli {
    /// Directory holding the SQL migrations
    #[arg(long, global = true, default_value = "migrations")]
    migrations: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Explore the graph and answer a question
    Read {
        question: String,
        /// Print the final traversal state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a graph JSON file ({"nodes": [...], "edges": [...]})
    Import { path: PathBuf },
    /// Embed key elements that have no embedding yet
    Embed,
    /// Delete every node and edge
    Reset {
        /// Required to actually delete
        #[arg(long)]
        yes: bool,
    },
    /// Show node and edge counts
    Stats,
}

fn api_key(env_name: &str) -> Result<String> {
    std::env::var(env_name).with_context(|| {
        format!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            env_name
        )
    })
}

fn build_embedder(config: &Config) -> Result<OpenAIEmbedder> {
    let cache = (config.embeddings.cache_capacity > 0)
        .then(|| Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity)));
    let embedder = OpenAIEmbedder::from_config(&config.embeddings, api_key(&config.embeddings.api_key_env)?, cache)?;
    Ok(embedder)
}

async fn open_db(config: &Config, migrations_dir: &Path) -> Result<Db> {
    let db = Db::new(config.db_path());
    let migrations_dir = migrations_dir.to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await
        .context("Failed to apply migrations")?;
    log::debug!("Database ready at {}", config.db_path().display());
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.graphreader.log_level.as_str()),
    )
    .init();

    let db = open_db(&config, &cli.migrations).await?;

    match cli.command {
        Command::Read { question, json } => {
            let code = run_read(&config, db, &question, json).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let graph: Graph = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse graph file {}", path.display()))?;
            let summary = import_graph(&db, &graph).await?;
            println!(
                "Imported {} nodes and {} new edges ({} skipped)",
                summary.nodes, summary.edges, summary.skipped_edges
            );
        }
        Command::Embed => {
            let embedder = build_embedder(&config)?;
            let stored = embed_missing_key_elements(&db, &embedder, config.embeddings.batch_size).await?;
            println!("Embedded {} key elements", stored);
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete the graph without --yes");
            }
            reset_graph(&db).await?;
            println!("Graph deleted");
        }
        Command::Stats => {
            let stats = graph_stats(&db).await?;
            println!("{:<16} {:>10}", "Node kind", "Count");
            println!("{:-<27}", "");
            for (kind, count) in &stats.nodes_by_kind {
                println!("{:<16} {:>10}", kind, count);
            }
            println!();
            println!("{:<16} {:>10}", "Relationship", "Count");
            println!("{:-<27}", "");
            for (relationship, count) in &stats.edges_by_relationship {
                println!("{:<16} {:>10}", relationship, count);
            }
            println!();
            println!("Embedded key elements: {}", stats.embedded_key_elements);
        }
    }

    Ok(())
}

/// Returns the process exit code: 0 when answered, 2 on a stall.
async fn run_read(config: &Config, db: Db, question: &str, json: bool) -> Result<i32> {
    let embedder = build_embedder(config)?;
    let oracle = ChatOracle::from_config(&config.chat, api_key(&config.chat.api_key_env)?)?;
    let reader = GraphReader::new(
        Arc::new(SqliteGraphStore::new(db)),
        Arc::new(embedder),
        Arc::new(oracle),
        config.traversal.clone(),
    );

    let outcome = reader.run(question).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match &outcome.status {
        TraversalStatus::Answered => {
            if !json {
                println!("Answer: {}", outcome.state.answer);
                println!();
                println!("Analysis: {}", outcome.state.analysis);
            }
            Ok(0)
        }
        TraversalStatus::Stalled { stage, action, reason } => {
            eprintln!("Traversal stalled in {} on action {:?}: {}", stage, action, reason);
            eprintln!("Previous actions: {}", outcome.state.previous_actions.join(" -> "));
            Ok(2)
        }
    }
}
