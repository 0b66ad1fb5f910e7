//! Knowledge Graph Memory Server Entry Point
//!
//! Serves the memory tools over the Model Context Protocol on stdio.
//! Logs go to stderr; stdout carries the protocol.

use clap::Parser;
use kg_memory::{
    EmbeddingConfig, InMemoryStore, MemoryConfig, MemoryService, RocksStore, VectorEngine,
    VectorStore,
};
use kg_server::McpServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kg-server")]
#[command(about = "Knowledge graph memory for AI agents, served over MCP")]
#[command(version)]
struct Args {
    /// RocksDB directory (default: ~/.kg-memory/db)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is persisted
    #[arg(long, conflicts_with = "data_dir")]
    in_memory: bool,

    /// fastembed model code
    #[arg(long, default_value = kg_memory::embedding::DEFAULT_MODEL)]
    model: String,

    /// Model cache directory (default: $KG_MEMORY_MODELS_PATH or ~/.kg-memory/models)
    #[arg(long)]
    models_path: Option<PathBuf>,

    /// Maximum number of embeddings kept in memory
    #[arg(long, default_value_t = kg_memory::embedding::DEFAULT_CACHE_CAPACITY)]
    embedding_cache: usize,

    /// Number of nearest entities used as search seeds
    #[arg(long, default_value_t = MemoryConfig::default().seed_limit)]
    seed_limit: usize,

    /// Seeds must lie strictly below this cosine distance
    #[arg(long, default_value_t = MemoryConfig::default().distance_threshold)]
    distance_threshold: f32,

    /// Attempts a contended set-entity makes before failing
    #[arg(long, default_value_t = MemoryConfig::default().max_write_attempts)]
    max_write_attempts: usize,
}

impl Args {
    fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            seed_limit: self.seed_limit,
            distance_threshold: self.distance_threshold,
            max_write_attempts: self.max_write_attempts,
        }
    }

    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model: self.model.clone(),
            models_path: self.models_path.clone(),
            show_download_progress: false,
            cache_capacity: self.embedding_cache,
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".kg-memory")
                .join("db")
        })
    }
}

fn open_store(args: &Args) -> kg_memory::Result<Arc<dyn VectorStore>> {
    if args.in_memory {
        tracing::info!("Using in-memory store; nothing will be persisted");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let data_dir = args.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {:?}", data_dir);
    Ok(Arc::new(RocksStore::open(&data_dir)?))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kg_server=info,kg_memory=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting KG memory MCP server");

    let store = match open_store(&args) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let embedding_config = args.embedding_config();
    let engine = match tokio::task::spawn_blocking(move || VectorEngine::new(&embedding_config))
        .await
    {
        Ok(Ok(engine)) => engine,
        Ok(Err(e)) => {
            tracing::error!("Failed to load embedding model: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Embedding model loader panicked: {}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(MemoryService::new(
        store,
        Arc::new(engine),
        &args.memory_config(),
    ));

    let server = Arc::new(McpServer::new(service));
    if let Err(e) = server.run().await {
        tracing::error!("MCP server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_memory_config() {
        let args = Args::try_parse_from(["kg-server"]).unwrap();
        let config = args.memory_config();
        assert_eq!(config.seed_limit, 3);
        assert_eq!(config.distance_threshold, 1.2);
        assert_eq!(config.max_write_attempts, 8);
        assert!(args.data_dir().ends_with(".kg-memory/db"));
    }

    #[test]
    fn test_in_memory_conflicts_with_data_dir() {
        let result = Args::try_parse_from(["kg-server", "--in-memory", "--data-dir", "/tmp/x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "kg-server",
            "--seed-limit",
            "5",
            "--distance-threshold",
            "0.8",
            "--models-path",
            "/opt/models",
        ])
        .unwrap();
        assert_eq!(args.memory_config().seed_limit, 5);
        assert_eq!(args.memory_config().distance_threshold, 0.8);
        assert_eq!(
            args.embedding_config().models_path,
            Some(PathBuf::from("/opt/models"))
        );
        assert_eq!(
            args.embedding_config().cache_capacity,
            kg_memory::embedding::DEFAULT_CACHE_CAPACITY
        );
    }

    #[test]
    fn test_open_in_memory_store() {
        let args = Args::try_parse_from(["kg-server", "--in-memory"]).unwrap();
        assert!(open_store(&args).is_ok());
    }

    #[test]
    fn test_open_rocks_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("db");
        let args = Args::try_parse_from([
            "kg-server".into(),
            "--data-dir".into(),
            data_dir.clone().into_os_string(),
        ])
        .unwrap();
        assert!(open_store(&args).is_ok());
        assert!(data_dir.is_dir());
    }
}
