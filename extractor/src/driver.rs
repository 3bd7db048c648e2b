//! Pipeline driver - runs the configured objects against a destination.
//!
//! Objects are processed strictly in order, one at a time. A failed fetch
//! skips that object; an authentication failure aborts the whole run.

use crate::sources::{RestSource, SoapSource};
use crate::ObjectSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use sfmc_pipeline::warehouse::{Destination, LoadInfo};
use sfmc_pipeline::{ApiSurface, AuthError, DateWindow, ObjectDefinition, PipelineConfig, TokenManager};
use tracing::{info, warn};

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One entry per loaded object, in configuration order.
    pub loads: Vec<LoadInfo>,
    /// Names of objects whose fetch failed.
    pub skipped: Vec<String>,
}

impl RunSummary {
    pub fn rows_loaded(&self) -> usize {
        self.loads.iter().map(|l| l.rows_loaded).sum()
    }
}

/// Runs every configured object through its source and into the destination.
///
/// # Responsibilities
/// - Pick the source for each object's API surface
/// - Compute the date window from load history
/// - Hand fetched records to the destination with the object's disposition
/// - Reset the dataset on request
pub struct PipelineDriver<D: Destination> {
    config: PipelineConfig,
    destination: D,
    rest: RestSource,
    soap: SoapSource,
}

impl<D: Destination> PipelineDriver<D> {
    pub fn new(config: PipelineConfig, destination: D, http_client: Client) -> Self {
        Self {
            config,
            destination,
            rest: RestSource::new(http_client.clone()),
            soap: SoapSource::new(http_client),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Date window for `object` in a run starting at `now`.
    ///
    /// Tables with no successful load yet use `initial_days_back` when set.
    pub fn window_for(
        &self,
        object: &ObjectDefinition,
        now: DateTime<Utc>,
    ) -> Result<Option<DateWindow>> {
        let previous = self
            .destination
            .last_successful_load(&object.table_name())
            .with_context(|| format!("Failed to read load history for {}", object.name))?;
        Ok(object.date_window(now, object.lookback_days(previous.is_some())))
    }

    /// Extracts and loads every configured object.
    ///
    /// # Errors
    /// Returns early on an [`AuthError`] or a destination failure. Any other
    /// fetch error is logged and the object is listed in
    /// [`RunSummary::skipped`].
    pub async fn run(&mut self, tokens: &mut TokenManager) -> Result<RunSummary> {
        let now = Utc::now();
        let mut summary = RunSummary::default();

        info!(
            pipeline = %self.config.pipeline.name,
            dataset = %self.config.pipeline.dataset,
            objects = self.config.objects.len(),
            "Starting pipeline run"
        );

        for object in &self.config.objects {
            let table = object.table_name();
            let window = self.window_for(object, now)?;

            let source: &dyn ObjectSource = match object.surface {
                ApiSurface::Rest => &self.rest,
                ApiSurface::Soap => &self.soap,
            };

            let records = match source.fetch(object, window, tokens).await {
                Ok(records) => records,
                Err(e) if e.downcast_ref::<AuthError>().is_some() => {
                    return Err(e.context(format!("Aborting run at {}", object.name)));
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(object = %object.name, error = %reason, "Skipping object");
                    summary.skipped.push(object.name.clone());
                    continue;
                }
            };

            let info = self
                .destination
                .load(
                    &table,
                    &records,
                    object.disposition(),
                    object.merge_key().as_deref(),
                )
                .with_context(|| format!("Failed to load {} into {}", object.name, table))?;

            info!(
                object = %object.name,
                table = %info.table,
                rows = info.rows_loaded,
                skipped_rows = info.rows_skipped,
                disposition = %info.disposition.as_str(),
                schema_version = info.schema_version,
                load_id = %info.load_id,
                "Loaded object"
            );
            summary.loads.push(info);
        }

        info!(
            loaded = summary.loads.len(),
            skipped = summary.skipped.len(),
            rows = summary.rows_loaded(),
            "Pipeline run finished"
        );
        Ok(summary)
    }

    /// Drops every table and all load state in the dataset.
    pub fn reset(&mut self) -> Result<Vec<String>> {
        let dropped = self
            .destination
            .drop_all()
            .context("Failed to reset pipeline state")?;
        info!(
            dataset = %self.config.pipeline.dataset,
            tables = dropped.len(),
            "Dropped pipeline state"
        );
        Ok(dropped)
    }
}
