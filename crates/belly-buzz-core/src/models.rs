//! Core data models that flow through the Belly Buzz pipeline.
//!
//! Run-scoped types ([`ContentItem`], [`ExtractedMention`], [`MentionGroup`])
//! live for one pipeline run; store-resident types ([`Restaurant`],
//! [`RestaurantMetrics`], [`SocialMention`]) are what the persistence layer
//! writes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound of the sentiment scale.
pub const SENTIMENT_MAX: f64 = 10.0;

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Social,
    Blog,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Social => "social",
            SourceKind::Blog => "blog",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed metadata attached to a [`ContentItem`] by its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMeta {
    /// Subreddit or feed name, used as the export's source label.
    pub label: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl ContentMeta {
    /// Render the populated fields as a string map.
    pub fn meta_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |k: &str, v: Option<String>| {
            if let Some(v) = v {
                map.insert(k.to_string(), v);
            }
        };
        put("label", self.label.clone());
        put("title", self.title.clone());
        put("url", self.url.clone());
        put("author", self.author.clone());
        put("score", self.score.map(|s| s.to_string()));
        put("num_comments", self.num_comments.map(|n| n.to_string()));
        put("posted_at", self.posted_at.map(|t| t.to_rfc3339()));
        map
    }
}

/// One unit of scraped raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub content: String,
    pub source: SourceKind,
    #[serde(default)]
    pub meta: ContentMeta,
}

impl ContentItem {
    pub fn new(content: impl Into<String>, source: SourceKind) -> Self {
        Self {
            content: content.into(),
            source,
            meta: ContentMeta::default(),
        }
    }

    /// Stable URL for the item.
    ///
    /// Falls back to a content hash when the source supplied no URL, so the
    /// same text always maps to the same `source_url` conflict key.
    pub fn source_url(&self) -> String {
        match self.meta.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(self.source.as_str().as_bytes());
                hasher.update(self.content.as_bytes());
                let digest = format!("{:x}", hasher.finalize());
                format!("content:{}:{}", self.source, &digest[..16])
            }
        }
    }

    pub fn source_label(&self) -> String {
        self.meta
            .label
            .clone()
            .unwrap_or_else(|| self.source.as_str().to_string())
    }
}

/// One restaurant reference extracted from one [`ContentItem`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMention {
    pub name: String,
    #[serde(default)]
    pub vibe: Option<String>,
    #[serde(default)]
    pub cuisine_tags: Vec<String>,
    #[serde(default)]
    pub recommended_dishes: Vec<String>,
    #[serde(default)]
    pub price_hint: Option<String>,
    /// Sentiment on a 0–10 scale. `None` when the extractor gave nothing usable.
    #[serde(default)]
    pub sentiment: Option<f64>,
}

impl ExtractedMention {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_sentiment(mut self, sentiment: f64) -> Self {
        self.sentiment = clamp_sentiment(sentiment);
        self
    }

    pub fn with_vibe(mut self, vibe: impl Into<String>) -> Self {
        self.vibe = Some(vibe.into());
        self
    }
}

/// Clamp a raw sentiment into `[0, SENTIMENT_MAX]`; non-finite values are dropped.
pub fn clamp_sentiment(raw: f64) -> Option<f64> {
    if raw.is_finite() {
        Some(raw.clamp(0.0, SENTIMENT_MAX))
    } else {
        None
    }
}

/// Enrichment result from the place-lookup collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceMatch {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub rating: Option<f64>,
    /// Price level on the 1–4 scale, when the provider reports one.
    pub price_level: Option<i64>,
    pub maps_url: Option<String>,
    pub photo_url: Option<String>,
}

/// Deduplication key a mention resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionKey {
    /// External place identifier.
    Place(String),
    /// Normalized restaurant name (see [`crate::normalize::normalize_name`]).
    Name(String),
}

impl ResolutionKey {
    pub fn as_str(&self) -> &str {
        match self {
            ResolutionKey::Place(id) => id,
            ResolutionKey::Name(name) => name,
        }
    }

    pub fn is_place(&self) -> bool {
        matches!(self, ResolutionKey::Place(_))
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionKey::Place(id) => write!(f, "place:{}", id),
            ResolutionKey::Name(name) => write!(f, "name:{}", name),
        }
    }
}

/// Provenance of a mention: the content item it was extracted from.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionOrigin {
    pub source: SourceKind,
    pub label: String,
    pub source_url: String,
    pub title: Option<String>,
    /// Item text, truncated to the configured bound.
    pub raw_text: String,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl MentionOrigin {
    pub fn from_item(item: &ContentItem, max_chars: usize) -> Self {
        Self {
            source: item.source,
            label: item.source_label(),
            source_url: item.source_url(),
            title: item.meta.title.clone(),
            raw_text: truncate_chars(&item.content, max_chars),
            score: item.meta.score,
            num_comments: item.meta.num_comments,
            posted_at: item.meta.posted_at,
        }
    }
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedMention {
    pub mention: ExtractedMention,
    pub origin: MentionOrigin,
}

/// All mentions sharing one [`ResolutionKey`] within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionGroup {
    pub key: ResolutionKey,
    /// PlaceMatch captured from the first mention that created the group.
    pub place: Option<PlaceMatch>,
    pub mentions: Vec<GroupedMention>,
}

impl MentionGroup {
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// The mention that created the group.
    pub fn first(&self) -> Option<&ExtractedMention> {
        self.mentions.first().map(|m| &m.mention)
    }
}

/// Canonical restaurant identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Restaurant {
    /// Store-assigned id; `None` until persisted.
    pub id: Option<String>,
    pub name: String,
    pub slug: String,
    /// Normalized name the group resolved under. Rows without a place id
    /// are matched on this, never on `slug`.
    pub name_key: String,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price_tier: i64,
    pub photo_url: Option<String>,
    pub vibe: Option<String>,
    pub google_place_id: Option<String>,
    pub google_maps_url: Option<String>,
    pub google_rating: Option<f64>,
    pub cuisine_tags: Vec<String>,
    pub recommended_dishes: Vec<String>,
    /// Write-only search vector.
    pub embedding: Option<Vec<f32>>,
}

impl Restaurant {
    /// `(0.0, 0.0)` means "unknown location", never a real point.
    pub fn has_location(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Per-restaurant scores, overwritten each run.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantMetrics {
    pub restaurant_id: String,
    pub buzz_score: f64,
    pub sentiment_score: f64,
    pub total_mentions: u32,
    pub is_trending: bool,
    pub last_updated_at: DateTime<Utc>,
}

/// One persisted raw mention, keyed by `source_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialMention {
    pub restaurant_id: String,
    pub source_type: SourceKind,
    pub source_url: String,
    pub title: Option<String>,
    pub raw_text: String,
    pub reddit_score: i64,
    pub reddit_num_comments: i64,
    pub sentiment_score: Option<f64>,
    pub vibe_extracted: Option<String>,
    pub dishes_mentioned: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

impl SocialMention {
    pub fn from_grouped(
        grouped: &GroupedMention,
        restaurant_id: &str,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let origin = &grouped.origin;
        Self {
            restaurant_id: restaurant_id.to_string(),
            source_type: origin.source,
            source_url: origin.source_url.clone(),
            title: origin.title.clone(),
            raw_text: origin.raw_text.clone(),
            reddit_score: origin.score.unwrap_or(0),
            reddit_num_comments: origin.num_comments.unwrap_or(0),
            sentiment_score: grouped.mention.sentiment.and_then(clamp_sentiment),
            vibe_extracted: grouped.mention.vibe.clone(),
            dishes_mentioned: grouped.mention.recommended_dishes.clone(),
            posted_at: origin.posted_at,
            scraped_at,
        }
    }
}
