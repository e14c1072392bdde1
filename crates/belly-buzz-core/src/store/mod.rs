//! Storage abstraction for the three persisted entity types.
//!
//! Every write goes through one endpoint, [`Store::upsert`], which takes a
//! [`Table`] and a field mapping ([`Record`]) and returns the id of the row
//! that was inserted or updated. The table declares its conflict key and
//! its column whitelist; fields outside the whitelist are ignored.
//!
//! # Partial updates
//!
//! A record only carries the fields that have a value (see
//! [`crate::persist`]). Stores must overwrite exactly those fields and leave
//! every other column of an existing row untouched, so a sparse re-sighting
//! never nulls out data a richer earlier sighting wrote.
//!
//! # Restaurant identity
//!
//! The `restaurants` table resolves an incoming record to an existing row
//! in this order:
//!
//! 1. the record has a `google_place_id` and a row carries it: update it;
//! 2. the record has a `google_place_id`, no row carries it, but a row with
//!    the same `name_key` and no place id exists: promote that row by
//!    attaching the place id;
//! 3. the record has no `google_place_id`: reuse the row with the same
//!    `name_key` and no place id;
//!
//! otherwise a new row is inserted with a fresh UUID. `slug` is display
//! data only: distinct names can share one (`"Seven Lives"` and
//! `"Seven-Lives"`), so it never decides identity.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Field mapping for one row. `None` values are never present.
pub type Record = Map<String, Value>;

/// The persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Restaurants,
    RestaurantMetrics,
    SocialMentions,
}

const RESTAURANT_COLUMNS: &[&str] = &[
    "name",
    "slug",
    "name_key",
    "address",
    "city",
    "latitude",
    "longitude",
    "price_tier",
    "photo_url",
    "vibe",
    "google_place_id",
    "google_maps_url",
    "google_rating",
    "cuisine_tags",
    "recommended_dishes",
    "embedding",
];

const METRICS_COLUMNS: &[&str] = &[
    "restaurant_id",
    "buzz_score",
    "sentiment_score",
    "total_mentions",
    "is_trending",
    "last_updated_at",
];

const MENTION_COLUMNS: &[&str] = &[
    "restaurant_id",
    "source_type",
    "source_url",
    "title",
    "raw_text",
    "reddit_score",
    "reddit_num_comments",
    "sentiment_score",
    "vibe_extracted",
    "dishes_mentioned",
    "posted_at",
    "scraped_at",
];

impl Table {
    pub const ALL: [Table; 3] = [
        Table::Restaurants,
        Table::RestaurantMetrics,
        Table::SocialMentions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Restaurants => "restaurants",
            Table::RestaurantMetrics => "restaurant_metrics",
            Table::SocialMentions => "social_mentions",
        }
    }

    /// Column that decides update-vs-insert.
    pub fn conflict_key(&self) -> &'static str {
        match self {
            Table::Restaurants => "google_place_id",
            Table::RestaurantMetrics => "restaurant_id",
            Table::SocialMentions => "source_url",
        }
    }

    /// Writable columns. The row id is never writable.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Restaurants => RESTAURANT_COLUMNS,
            Table::RestaurantMetrics => METRICS_COLUMNS,
            Table::SocialMentions => MENTION_COLUMNS,
        }
    }

    /// Keep only whitelisted, non-null fields.
    pub fn filter(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(k, v)| !v.is_null() && self.columns().contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Abstract storage backend.
///
/// Implementations must be `Send + Sync`; the orchestrator may finalize
/// several groups concurrently against one store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or update one row and return its id.
    ///
    /// For `restaurants` the id is the row's UUID, for `restaurant_metrics`
    /// it is the `restaurant_id`, and for `social_mentions` it is the
    /// mention row's UUID.
    async fn upsert(&self, table: Table, record: &Record) -> Result<String>;
}

/// String field of a record, trimmed; `None` when missing or blank.
pub fn text_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
