//! CivLens Core Library
//!
//! This library implements the core of a remote model-catalog browser and
//! downloader for the CivitAI HTTP API: throttled, allowlisted API access,
//! content-rating normalization and filtering, dual-strategy search with
//! cursor bookkeeping, cancellable background downloads, and a
//! change-suppressed progress view for polling UIs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - Rate-limited, allowlist-guarded HTTP client and wire types
//! - [`filter`] - Content-level normalization, local refinement, previews
//! - [`search`] - Dual-strategy search aggregation and pagination
//! - [`jobs`] - Background download jobs with cooperative cancellation
//! - [`progress`] - Poll-friendly, diff-suppressed progress reporting

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod filter;
pub mod jobs;
pub mod progress;
pub mod search;

// Re-export commonly used types
pub use api::{ApiError, CatalogClient, ClientConfig, RequestGate, parse_model_url};
pub use filter::{ContentLevel, model_content_level, normalize};
pub use jobs::path::{DestinationResolver, ModelDirLayout};
pub use jobs::{DownloadJobManager, JobSnapshot, JobStatus, StopOutcome};
pub use progress::{PollUpdate, ProgressReporter, ProgressView};
pub use search::{SearchAggregator, SearchFilters, SearchState};
