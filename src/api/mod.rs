//! HTTP access to the upstream model catalog.
//!
//! Everything that touches the network lives here: the shared request gate,
//! the allowlist-guarded retrying client, and the serde types for the
//! catalog's JSON responses.

mod client;
pub mod config;
mod error;
pub mod gate;
pub mod types;

pub use client::{CatalogClient, parse_model_url};
pub use config::ClientConfig;
pub use error::ApiError;
pub use gate::{RequestGate, parse_retry_after};
