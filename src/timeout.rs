//! Per-call deadline for collaborators.
//!
//! [`Timed`] wraps any boxed collaborator and bounds each call with
//! `tokio::time::timeout`. An expired call becomes
//! [`CollaboratorError::Timeout`] and is handled like any other failure of
//! that collaborator.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use belly_buzz_core::models::{ContentItem, ExtractedMention, PlaceMatch};
use belly_buzz_core::traits::{ContentSource, Embedder, Extractor, PlaceLookup};
use belly_buzz_core::CollaboratorError;

pub struct Timed<T: ?Sized> {
    secs: u64,
    inner: Box<T>,
}

impl<T: ?Sized> Timed<T> {
    pub fn new(secs: u64, inner: Box<T>) -> Self {
        Self { secs, inner }
    }
}

async fn bounded<F, R>(secs: u64, call: F) -> Result<R, CollaboratorError>
where
    F: Future<Output = Result<R, CollaboratorError>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(secs)),
    }
}

#[async_trait]
impl<T: ContentSource + ?Sized> ContentSource for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn collect(
        &self,
        limit: usize,
        days_back: u32,
    ) -> Result<Vec<ContentItem>, CollaboratorError> {
        bounded(self.secs, self.inner.collect(limit, days_back)).await
    }
}

#[async_trait]
impl<T: Extractor + ?Sized> Extractor for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>, CollaboratorError> {
        bounded(self.secs, self.inner.extract(content)).await
    }
}

#[async_trait]
impl<T: PlaceLookup + ?Sized> PlaceLookup for Timed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_place(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<PlaceMatch>, CollaboratorError> {
        bounded(self.secs, self.inner.find_place(name, city)).await
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Timed<T> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        bounded(self.secs, self.inner.embed(text)).await
    }
}
