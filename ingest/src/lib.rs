//! Timeline Ingest - Connectors that pull personal records from remote
//! services and stream them as [`CommonItem`](timeline::CommonItem)s.
//!
//! # Architecture
//!
//! ```text
//!   Remote API (Google Calendar, ...)
//!          ↓
//!     authenticated reqwest::Client (token supplied by host)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       Connector (implements trait)       │
//! │  - one ListingTask per sub-source        │
//! │  - shared RateLimiter                    │
//! │  - normalize records to CommonItem       │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       IngestionPipeline                  │
//! │  - fan-in onto one bounded channel       │
//! │  - close channel once, after all tasks   │
//! │  - aggregate task errors                 │
//! └─────────────────────────────────────────┘
//!          ↓
//!       Host consumer
//! ```
//!
//! Media bytes are not part of listing. The host downloads them on demand
//! through [`ContentFetcher`], which retries and skips items still being
//! processed by the provider.
//!
//! # Core Types
//!
//! - [`Connector`] - Trait that all connectors implement
//! - [`DataSource`] - Registration metadata (id, name, OAuth scopes, rate limit)
//! - [`ListOptions`] - Time window and optional import file
//! - [`SourceRegistry`] - Connectors a host has initialized, by id
//! - [`IngestionPipeline`] - Concurrent listing with a single channel owner

mod connector;
mod types;
pub mod connectors;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod registry;
pub mod transport;

// Re-export public types
pub use connector::Connector;
pub use error::{IngestError, Result};
pub use fetcher::{ContentFetcher, FetchOutcome, RetryPolicy};
pub use pipeline::{IngestionPipeline, ItemSink, ListingSummary, ListingTask, PipelineState};
pub use registry::SourceRegistry;
pub use types::{DataSource, ListOptions, OAuthConfig};
