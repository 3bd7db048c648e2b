//! Drops every table and all load state of the configured dataset, so the
//! next `sfmc-pipeline` run starts from scratch.

use anyhow::Result;
use sfmc_extractor::{setup, PipelineDriver};
use sfmc_pipeline::http;
use tracing::info;

fn main() -> Result<()> {
    setup::init();

    let config = setup::load_config()?;
    let warehouse = setup::open_warehouse(&config)?;

    let mut driver = PipelineDriver::new(config, warehouse, http::build_client()?);
    let dropped = driver.reset()?;
    for table in &dropped {
        info!(table = %table, "Dropped");
    }
    info!(tables = dropped.len(), "Pipeline state reset");
    Ok(())
}
