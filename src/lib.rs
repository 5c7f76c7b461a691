//! Recommendation core for a Vietnamese movie chatbot.
//!
//! Takes the slot-filled output of an upstream NLU service, resolves it into
//! canonical facets (genres, persons, years, ratings), builds a candidate pool
//! against a movie metadata provider, and produces the fulfillment payload the
//! chat layer sends back to the user. Ambiguous turns run through a tiered
//! intent-classification cascade before falling back.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use cache::{Cache, CacheKey};
pub use config::{Config, Tuning};
pub use error::{AppError, AppResult};
pub use models::{Intent, NluResult, ResponsePayload};
pub use services::orchestrator::Recommender;
