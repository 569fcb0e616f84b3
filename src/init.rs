//! Shared initialization logic for the CLI entry point.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::connection::{init_db, load_db_config, DbConfig, LgDb};
use crate::db::schema::apply_schema;
use crate::llm::{create_backend, Backend, LlmBackend, LlmConfig};
use crate::service::AnalysisService;
use crate::session::TaskSignalManager;

/// Application context holding the database handle and shared services.
pub struct AppContext {
    pub db: Arc<LgDb>,
    pub data_path: PathBuf,
    pub signals: Arc<TaskSignalManager>,
    pub llm: Arc<dyn LlmBackend>,
    pub analysis_service: Arc<AnalysisService>,
}

impl AppContext {
    /// Data path priority: explicit path > LOREGRAPH_DATA_PATH env >
    /// ./.loregraph (if exists) > ~/.loregraph
    pub async fn new(explicit_path: Option<PathBuf>) -> Result<Self> {
        let data_path = explicit_path
            .or_else(|| std::env::var("LOREGRAPH_DATA_PATH").ok().map(PathBuf::from))
            .or_else(|| {
                let local_path = Path::new(".loregraph");
                if local_path.exists() && local_path.is_dir() {
                    Some(local_path.to_path_buf())
                } else {
                    None
                }
            })
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".loregraph"))
                    .unwrap_or_else(|| PathBuf::from(".loregraph"))
            });

        tracing::info!("Using data path: {}", data_path.display());

        let db_config = load_db_config(&data_path);
        match &db_config {
            DbConfig::Embedded { .. } => tracing::info!("Using embedded database"),
            DbConfig::Remote { endpoint, .. } => {
                tracing::info!("Connecting to remote database: {}", endpoint)
            }
        }

        let db = init_db(&db_config, &data_path).await?;
        tracing::info!("Database connected");

        apply_schema(&db).await?;
        tracing::info!("Schema applied");

        let db = Arc::new(db);

        let llm_config = LlmConfig::from_env();
        let llm_is_cloud = matches!(llm_config.backend, Backend::OpenAi | Backend::Anthropic);
        let llm: Arc<dyn LlmBackend> = Arc::from(create_backend(&llm_config)?);
        tracing::info!(backend = ?llm_config.backend, model = %llm_config.model, "LLM backend configured");

        let signals = Arc::new(TaskSignalManager::new());
        let analysis_service = Arc::new(AnalysisService::new(
            db.clone(),
            llm.clone(),
            llm_is_cloud,
            signals.clone(),
        ));

        Ok(Self {
            db,
            data_path,
            signals,
            llm,
            analysis_service,
        })
    }
}
