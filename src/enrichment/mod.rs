//! Metadata enrichment - fetches artist and album metadata from external services.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal types that represent our business logic
//! - **API DTOs** (`musicbrainz/dto.rs`, `lastfm/dto.rs`, ...) - Exact API response shapes
//! - **Adapters** - Convert DTOs to domain models
//! - **Clients** - HTTP clients for external APIs, sharing one [`http::ApiClient`]
//! - **Scoring / image** - Confidence scoring for name searches, artwork validation
//! - **Service** - High-level orchestration of the enrichment flow
//!
//! This decoupling means:
//! 1. API changes don't ripple through our codebase
//! 2. We can test API contracts independently
//! 3. We can swap providers without changing business logic
//!
//! # Usage
//!
//! ```ignore
//! use music_enricher::enrichment::{EnrichmentService, ProgressNotifier};
//!
//! let notifier = ProgressNotifier::default();
//! let service = EnrichmentService::new(pool, settings, Arc::new(notifier.clone()))?;
//!
//! let summary = service.enrich(EntityType::Artist, 42).await?;
//! println!("{} fields updated", summary.fields_updated.len());
//! ```

pub mod coverart;
pub mod domain;
pub mod events;
pub mod fanart;
pub mod http;
pub mod image;
pub mod lastfm;
pub mod log;
pub mod musicbrainz;
pub mod scoring;
pub mod service;
pub mod traits;

pub use domain::{
    EnrichmentError, ImageRejection, ProviderFailure, RejectedField, RunOutcome, RunSummary,
};
pub use events::{EnrichmentEvent, EventPublisher, ProgressNotifier};
pub use http::{ApiClient, HttpSettings};
pub use log::{EnrichmentStats, StatsPeriod};
pub use service::{EnrichmentService, RunHandle, TriggerSource};
