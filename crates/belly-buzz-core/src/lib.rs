//! # Belly Buzz Core
//!
//! Runtime-free logic for the Belly Buzz mention pipeline: data models,
//! name normalization, collaborator traits, identity resolution, scoring,
//! canonical record building, persistence record mapping, and the store
//! abstraction.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The `belly-buzz`
//! crate supplies the real collaborators (LLM extraction, Google Places,
//! OpenAI embeddings, SQLite) and the orchestrator that drives them.
//!
//! ## Flow
//!
//! ```text
//! ExtractedMention ──▶ IdentityResolver ──▶ MentionQueue ──▶ MentionGroup
//!                                                             │
//!            ┌────────────────────────────────────────────────┤
//!            ▼                     ▼                          ▼
//!      metrics::score       builder::build            persist::persist_group
//! ```

pub mod builder;
pub mod error;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod persist;
pub mod resolve;
pub mod store;
pub mod traits;

pub use error::CollaboratorError;
