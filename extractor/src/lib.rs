//! SFMC extractor - fetches Marketing Cloud objects and loads them into the
//! warehouse.
//!
//! # Architecture
//!
//! ```text
//!        PipelineConfig (ordered object list)
//!                     ↓
//! ┌─────────────────────────────────────────┐
//! │       PipelineDriver                     │
//! │  - Date window from load history         │
//! │  - Skip failed objects, abort on auth    │
//! └─────────────────────────────────────────┘
//!          ↓                        ↓
//!   RestSource ($page)     SoapSource (Retrieve)
//!          ↓                        ↓
//!        TokenManager (one token per surface)
//!                     ↓
//!        Destination (SQLite dataset)
//! ```
//!
//! # Core Types
//!
//! - [`ObjectSource`] - Trait implemented by each API surface fetcher
//! - [`RestSource`] / [`SoapSource`] - The two fetchers
//! - [`PipelineDriver`] - Runs the configured objects, resets the dataset
//! - [`RunSummary`] - Loads and skipped objects of one run

mod source;

pub mod driver;
pub mod setup;
pub mod sources;

pub use driver::{PipelineDriver, RunSummary};
pub use source::ObjectSource;
pub use sources::{RestSource, SoapSource};
