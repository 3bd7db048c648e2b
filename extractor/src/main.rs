use anyhow::{Context, Result};
use sfmc_extractor::{setup, PipelineDriver};
use sfmc_pipeline::{http, CredentialStore, TokenManager};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup::init();
    info!("SFMC pipeline starting...");

    let config = setup::load_config()?;

    let secrets_path = setup::secrets_path();
    let credentials = CredentialStore::load(&secrets_path)
        .with_context(|| format!("Failed to load credentials from {}", secrets_path))?;
    let configured = credentials.configured();
    info!(surfaces = ?configured, "Credentials loaded");

    let http_client = http::build_client()?;
    let warehouse = setup::open_warehouse(&config)?;

    let mut tokens = TokenManager::new(credentials, http_client.clone());
    let mut driver = PipelineDriver::new(config, warehouse, http_client);
    let summary = driver.run(&mut tokens).await?;

    for load in &summary.loads {
        info!(
            table = %load.table,
            rows = load.rows_loaded,
            load_id = %load.load_id,
            "Load info"
        );
    }
    if !summary.skipped.is_empty() {
        warn!(objects = ?summary.skipped, "Some objects were skipped");
    }
    info!(
        tables = summary.loads.len(),
        rows = summary.rows_loaded(),
        token_exchanges = tokens.exchange_count(),
        "SFMC pipeline finished"
    );
    Ok(())
}
