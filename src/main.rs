//! PaperSorter: academic paper recommendation pipeline.
//!
//! CLI surface: `init`, `update`, `predict`, `broadcast`, `embeddings
//! {status|clear|reset|index on|index off}`, `models
//! {list|show|activate|deactivate|export|import|validate|delete}`
//!.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use papersorter::config::Config;
use papersorter::dedupe::{DedupeConfig, Deduper};
use papersorter::dispatch::dispatcher::Dispatcher;
use papersorter::dispatch::providers::{chat_a::ChatAProvider, chat_b::ChatBProvider, email::EmailProvider};
use papersorter::embedding::{EmbeddingClient, Embedder, EmbedderConfig};
use papersorter::error;
use papersorter::feed::FeedFetcher;
use papersorter::orchestrator::{BroadcastDriver, UpdateDriver};
use papersorter::queue::QueueManager;
use papersorter::scoring::{self, Scorer};
use papersorter::store::Database;

#[derive(Parser)]
#[command(name = "papersorter", about = "Academic paper recommendation pipeline")]
struct Cli {
    #[arg(long, default_value = "papersorter.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and verify connectivity.
    Init,
    /// Run one Update driver tick: fetch, dedupe, embed, score, enqueue.
    Update {
        /// Rescore every embedded article under every active model,
        /// overwriting existing score rows.
        #[arg(long)]
        force: bool,
    },
    /// Alias for `update --force`, scoring only (no fetch/embed), used
    /// for quick re-evaluation after a model change.
    Predict,
    /// Run one Broadcast driver tick: dispatch, purge.
    Broadcast,
    /// Embedding maintenance.
    Embeddings {
        #[command(subcommand)]
        action: EmbeddingsAction,
    },
    /// Model artifact maintenance.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum EmbeddingsAction {
    Status,
    Clear,
    Reset,
    Index {
        #[command(subcommand)]
        toggle: IndexToggle,
    },
}

#[derive(Subcommand)]
enum IndexToggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ModelsAction {
    List,
    Show { id: i64 },
    Activate { id: i64 },
    Deactivate { id: i64 },
    Export { id: i64, path: PathBuf },
    Import { name: String, score_name: String, path: PathBuf },
    Validate { id: i64 },
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::from(3);
        }
    };

    let db = match Database::open(&config.db, 16).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "failed to open database");
            return ExitCode::from(4);
        }
    };

    match run(&config, &db, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::from(1)
        }
    }
}

async fn run(config: &Config, db: &Database, command: Command) -> Result<(), error::CoreError> {
    match command {
        Command::Init => {
            tracing::info!("database initialized");
            Ok(())
        }
        Command::Update { force } => {
            let driver = build_update_driver(config);
            match driver.run_once(db, force).await? {
                Some(report) => {
                    tracing::info!(
                        fetched = report.fetched_sources,
                        admitted = report.admitted_articles,
                        rejected = report.rejected_articles,
                        embedded = report.embedded,
                        scored = report.scored,
                        "update tick complete"
                    );
                }
                None => tracing::info!("update tick skipped: already in progress"),
            }
            Ok(())
        }
        Command::Predict => {
            let scorer = Scorer::new(PathBuf::from(&config.scoring.model_dir));
            let queue = QueueManager::new();
            let report = scorer.run_once(db, &queue, true).await?;
            tracing::info!(scored = report.scored, "predict complete");
            Ok(())
        }
        Command::Broadcast => {
            let driver = build_broadcast_driver(config)?;
            match driver.run_once(db).await? {
                Some(report) => tracing::info!(
                    delivered = report.delivered,
                    suppressed = report.suppressed,
                    purged = report.purged,
                    "broadcast tick complete"
                ),
                None => tracing::info!("broadcast tick skipped: already in progress"),
            }
            Ok(())
        }
        Command::Embeddings { action } => run_embeddings(db, action).await,
        Command::Models { action } => run_models(config, db, action).await,
    }
}

fn build_update_driver(config: &Config) -> UpdateDriver {
    let http = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.feed_defaults.ssl_verify)
        .build()
        .expect("http client configuration is valid");
    if !config.feed_defaults.ssl_verify {
        tracing::warn!("SSL verification disabled for feed fetching; this is an insecure legacy posture");
    }

    let fetcher = FeedFetcher::new(http.clone(), config.feed_defaults.workers);
    let deduper = Deduper::new(DedupeConfig {
        window_days: config.feed_defaults.dedup_window_days,
        title_threshold: config.feed_defaults.dedup_threshold,
    });
    let embedding_client = EmbeddingClient::new(http, &config.embedding_api);
    let embedder = Embedder::new(
        embedding_client,
        EmbedderConfig {
            batch_size: config.embedding_api.batch_size as i64,
            dimensions: config.embedding_api.dimensions,
            char_budget: config.embedding_api.char_budget,
        },
    );
    let scorer = Scorer::new(PathBuf::from(&config.scoring.model_dir));
    let queue = Arc::new(QueueManager::new());

    UpdateDriver::new(fetcher, deduper, embedder, scorer, queue)
}

fn build_broadcast_driver(config: &Config) -> Result<BroadcastDriver, error::CoreError> {
    let http = reqwest::Client::new();
    let feedback_base_url = config.notification.feedback_base_url.clone();
    let chat_a = ChatAProvider::new(http.clone(), feedback_base_url.clone());
    let chat_b = ChatBProvider::new(http, feedback_base_url.clone());
    let email = EmailProvider::new(&config.smtp, feedback_base_url)
        .map_err(error::CoreError::Permanent)?;

    let dispatcher = Dispatcher::new(chat_a, chat_b, email, config.notification.clone());
    Ok(BroadcastDriver::new(dispatcher, config.retention.broadcast_days, config.retention.queue_days))
}

async fn run_embeddings(db: &Database, action: EmbeddingsAction) -> Result<(), error::CoreError> {
    match action {
        EmbeddingsAction::Status => {
            let (total, missing) = db.embedding_counts().await?;
            tracing::info!(total = total, missing = missing, "embedding status");
        }
        EmbeddingsAction::Clear | EmbeddingsAction::Reset => {
            let removed = db.clear_embeddings().await?;
            tracing::info!(removed = removed, "embeddings cleared");
        }
        EmbeddingsAction::Index { toggle } => {
            let enabled = matches!(toggle, IndexToggle::On);
            db.set_embeddings_index_enabled(enabled).await?;
            tracing::info!(enabled = enabled, "embeddings index toggled");
        }
    }
    Ok(())
}

async fn run_models(config: &Config, db: &Database, action: ModelsAction) -> Result<(), error::CoreError> {
    let model_dir = PathBuf::from(&config.scoring.model_dir);
    match action {
        ModelsAction::List => {
            let models = db.list_models().await?;
            for model in models {
                tracing::info!(id = model.id, name = %model.name, active = model.is_active, "model");
            }
        }
        ModelsAction::Show { id } => {
            let model = db.get_model(id).await?;
            tracing::info!(model = ?model.map(|m| m.name), "model");
        }
        ModelsAction::Activate { id } => {
            db.set_model_active(id, true).await?;
        }
        ModelsAction::Deactivate { id } => {
            db.set_model_active(id, false).await?;
        }
        ModelsAction::Export { id, path } => {
            let artifact = scoring::ModelArtifact::load(&model_dir, id)?;
            let bytes = bincode::serialize(&artifact)
                .map_err(|e| error::CoreError::InvariantViolation(e.to_string()))?;
            std::fs::write(&path, bytes).map_err(|e| error::CoreError::Permanent(e.to_string()))?;
        }
        ModelsAction::Import { name, score_name, path } => {
            let bytes = std::fs::read(&path).map_err(|e| error::CoreError::Permanent(e.to_string()))?;
            let artifact: scoring::ModelArtifact = bincode::deserialize(&bytes)
                .map_err(|e| error::CoreError::SchemaMismatch(e.to_string()))?;
            let model = db.create_model(&name, &score_name).await?;
            artifact.save(&model_dir, model.id)?;
        }
        ModelsAction::Validate { id } => {
            let artifact = scoring::ModelArtifact::load(&model_dir, id)?;
            let zeros = vec![0.0f32; artifact.dim];
            let standardized = artifact.standardize(&zeros)?;
            let _ = artifact.predict(&standardized);
            tracing::info!(id = id, dim = artifact.dim, "model artifact validates");
        }
        ModelsAction::Delete { id } => {
            db.delete_model(id).await?;
        }
    }
    Ok(())
}
