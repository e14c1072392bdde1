//! Collaborator traits.
//!
//! The pipeline reaches every external system through one of these traits.
//! Implementations return [`CollaboratorError`] variants rather than
//! panicking; a missing result (`Ok(None)`, `Ok(vec![])`) is a valid outcome,
//! not an error.
//!
//! | Trait | Role |
//! |-------|------|
//! | [`ContentSource`] | Produces raw [`ContentItem`]s (social posts, feeds) |
//! | [`Extractor`] | Turns one item's text into [`ExtractedMention`]s |
//! | [`PlaceLookup`] | Finds the external place for a name in a city |
//! | [`Embedder`] | Produces a search vector for a text |
//!
//! Storage is reached through [`crate::store::Store`].

use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::models::{ContentItem, ExtractedMention, PlaceMatch};

/// Token sent to the embedder when there is nothing else to embed.
pub const EMPTY_EMBEDDING_FALLBACK: &str = "restaurant";

/// Default vector width for the search embedding column.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short label for logs and reports (e.g. `"reddit:FoodToronto"`).
    fn name(&self) -> &str;

    /// Fetch up to `limit` items from the last `days_back` days.
    async fn collect(
        &self,
        limit: usize,
        days_back: u32,
    ) -> Result<Vec<ContentItem>, CollaboratorError>;
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract restaurant mentions from free text.
    ///
    /// Malformed or truncated model output yields an empty list, not an
    /// error. Errors are reserved for transport and availability failures.
    async fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>, CollaboratorError>;
}

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    fn name(&self) -> &str;

    /// Look up `name` in `city`. `Ok(None)` means no match.
    async fn find_place(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<PlaceMatch>, CollaboratorError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed one text. Implementations must pass their input through
    /// [`guard_embedding_input`] first.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;
}

/// Replace blank embedding input with [`EMPTY_EMBEDDING_FALLBACK`].
pub fn guard_embedding_input(text: &str) -> &str {
    if text.trim().is_empty() {
        EMPTY_EMBEDDING_FALLBACK
    } else {
        text
    }
}

/// Place lookup that never finds anything. Used when enrichment is disabled.
pub struct NoPlaces;

#[async_trait]
impl PlaceLookup for NoPlaces {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn find_place(
        &self,
        _name: &str,
        _city: &str,
    ) -> Result<Option<PlaceMatch>, CollaboratorError> {
        Ok(None)
    }
}

/// Embedder used when no provider is configured; every call is `Unavailable`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_embedding_input() {
        assert_eq!(guard_embedding_input(""), "restaurant");
        assert_eq!(guard_embedding_input("  \n"), "restaurant");
        assert_eq!(guard_embedding_input("Pai"), "Pai");
    }

    #[tokio::test]
    async fn test_disabled_embedder_is_unavailable() {
        let err = DisabledEmbedder.embed("Pai").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_no_places_never_matches() {
        let found = NoPlaces.find_place("Pai", "Toronto").await.unwrap();
        assert!(found.is_none());
    }
}
