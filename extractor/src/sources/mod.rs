//! Fetchers for the two API surfaces.

pub mod rest;
pub mod soap;

pub use rest::RestSource;
pub use soap::SoapSource;
