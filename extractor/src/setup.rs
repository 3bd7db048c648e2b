//! Startup shared by the binaries: `.env`, tracing, configuration and the
//! warehouse.

use anyhow::{Context, Result};
use sfmc_pipeline::config::load_or_default;
use sfmc_pipeline::warehouse::SqliteWarehouse;
use sfmc_pipeline::PipelineConfig;
use tracing::info;

/// Pipeline file location.
pub const CONFIG_PATH_ENV: &str = "SFMC_PIPELINE_CONFIG";
/// Secrets file location.
pub const SECRETS_PATH_ENV: &str = "SFMC_SECRETS_FILE";

const DEFAULT_CONFIG_PATH: &str = "pipeline.toml";
const DEFAULT_SECRETS_PATH: &str = ".secrets/sfmc.toml";
const DEFAULT_LOG_FILTER: &str = "sfmc_extractor=info,sfmc_pipeline=info";

/// Loads `.env` (if any) and installs the fmt subscriber. `RUST_LOG`
/// overrides the default filter.
pub fn init() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}

pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn secrets_path() -> String {
    std::env::var(SECRETS_PATH_ENV).unwrap_or_else(|_| DEFAULT_SECRETS_PATH.to_string())
}

/// Reads and validates the pipeline file, falling back to the built-in catalog.
pub fn load_config() -> Result<PipelineConfig> {
    let path = config_path();
    let config = load_or_default(&path)
        .with_context(|| format!("Failed to load pipeline configuration from {}", path))?;
    info!(
        path = %path,
        pipeline = %config.pipeline.name,
        dataset = %config.pipeline.dataset,
        objects = config.objects.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Opens the SQLite file backing the configured dataset.
pub fn open_warehouse(config: &PipelineConfig) -> Result<SqliteWarehouse> {
    let warehouse = SqliteWarehouse::open(&config.pipeline.warehouse_path, &config.pipeline.dataset)
        .with_context(|| {
            format!(
                "Failed to open warehouse at {}",
                config.pipeline.warehouse_path
            )
        })?;
    info!(path = %config.pipeline.warehouse_path, "Warehouse opened");
    Ok(warehouse)
}
