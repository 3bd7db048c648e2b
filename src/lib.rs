// Object definitions and API surfaces
pub mod object;

// Pipeline configuration (TOML + built-in object catalog)
pub mod config;

// Client credentials per API surface
pub mod credentials;

// OAuth2 client-credentials tokens
pub mod auth;

// Shared HTTP client settings
pub mod http;

// Warehouse destination and load state
pub mod warehouse;

pub use auth::{AuthError, Token, TokenManager};
pub use config::PipelineConfig;
pub use credentials::{ClientCredentials, CredentialStore};
pub use object::{ApiSurface, DateWindow, ObjectDefinition, RestEndpoint, WriteDisposition};

/// A single extracted object, keyed by column name. Loaded as-is.
pub type Record = serde_json::Map<String, serde_json::Value>;
