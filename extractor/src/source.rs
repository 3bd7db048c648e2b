use anyhow::Result;
use async_trait::async_trait;
use sfmc_pipeline::{ApiSurface, DateWindow, ObjectDefinition, Record, TokenManager};

/// Fetcher for one API surface.
///
/// Sources are stateless: tokens live in the run's [`TokenManager`], which
/// is passed in by the pipeline driver for every fetch.
///
/// # Lifecycle
/// 1. Driver picks the source whose [`surface`](ObjectSource::surface)
///    matches the object definition
/// 2. Driver computes the date window (if any) for this run
/// 3. Source requests a token per HTTP call, fetches every page and
///    returns the decoded records
/// 4. Driver hands the records to the destination
///
/// # Example
/// ```no_run
/// use sfmc_extractor::ObjectSource;
/// use sfmc_pipeline::{ApiSurface, DateWindow, ObjectDefinition, Record, TokenManager};
/// use async_trait::async_trait;
/// use anyhow::Result;
///
/// struct StaticSource;
///
/// #[async_trait]
/// impl ObjectSource for StaticSource {
///     fn surface(&self) -> ApiSurface {
///         ApiSurface::Rest
///     }
///
///     async fn fetch(
///         &self,
///         object: &ObjectDefinition,
///         window: Option<DateWindow>,
///         tokens: &mut TokenManager,
///     ) -> Result<Vec<Record>> {
///         // 1. tokens.get_token(self.surface()) before each request
///         // 2. Page through the API
///         // 3. Convert each result into a Record
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// The API surface this source speaks.
    fn surface(&self) -> ApiSurface;

    /// Fetches every record of `object`.
    ///
    /// # Arguments
    /// * `object` - Definition being extracted
    /// * `window` - Date bounds for this run, `None` for a full extraction
    /// * `tokens` - Run-scoped token holder
    ///
    /// # Error Handling
    /// - Token endpoint failures surface as [`sfmc_pipeline::AuthError`] in the
    ///   error chain; the driver aborts the run on them
    /// - Any other error skips this object only
    async fn fetch(
        &self,
        object: &ObjectDefinition,
        window: Option<DateWindow>,
        tokens: &mut TokenManager,
    ) -> Result<Vec<Record>>;
}
