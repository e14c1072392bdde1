//! Record mapping and per-group persistence.
//!
//! The `*_record` functions turn typed rows into sparse [`Record`]s: absent
//! values are left out entirely (never written as null), enums become their
//! string form, and timestamps become RFC 3339 text.
//!
//! [`persist_group`] writes one finalized group in dependency order:
//! restaurant, then metrics, then mentions. Each write is isolated; a
//! failure is recorded in [`PersistOutcome::errors`] and only skips the
//! writes that need its result.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::metrics::Scores;
use crate::models::{GroupedMention, Restaurant, RestaurantMetrics, SocialMention};
use crate::store::{Record, Store, Table};

fn timestamp(t: &DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn put_text(record: &mut Record, key: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        record.insert(key.to_string(), Value::String(v.to_string()));
    }
}

fn put_list(record: &mut Record, key: &str, values: &[String]) {
    if !values.is_empty() {
        record.insert(key.to_string(), json!(values));
    }
}

pub fn restaurant_record(restaurant: &Restaurant) -> Record {
    let mut r = Record::new();
    put_text(&mut r, "name", Some(&restaurant.name));
    put_text(&mut r, "slug", Some(&restaurant.slug));
    put_text(&mut r, "name_key", Some(&restaurant.name_key));
    put_text(&mut r, "address", Some(&restaurant.address));
    put_text(&mut r, "city", Some(&restaurant.city));
    // (0, 0) is "unknown"; leave any stored coordinates alone.
    if restaurant.has_location() {
        r.insert("latitude".to_string(), json!(restaurant.latitude));
        r.insert("longitude".to_string(), json!(restaurant.longitude));
    }
    r.insert("price_tier".to_string(), json!(restaurant.price_tier.clamp(1, 4)));
    put_text(&mut r, "photo_url", restaurant.photo_url.as_deref());
    put_text(&mut r, "vibe", restaurant.vibe.as_deref());
    put_text(&mut r, "google_place_id", restaurant.google_place_id.as_deref());
    put_text(&mut r, "google_maps_url", restaurant.google_maps_url.as_deref());
    if let Some(rating) = restaurant.google_rating.filter(|v| v.is_finite()) {
        r.insert("google_rating".to_string(), json!(rating));
    }
    put_list(&mut r, "cuisine_tags", &restaurant.cuisine_tags);
    put_list(&mut r, "recommended_dishes", &restaurant.recommended_dishes);
    if let Some(embedding) = restaurant.embedding.as_ref().filter(|e| !e.is_empty()) {
        r.insert("embedding".to_string(), json!(embedding));
    }
    r
}

pub fn metrics_record(metrics: &RestaurantMetrics) -> Record {
    let mut r = Record::new();
    r.insert("restaurant_id".to_string(), json!(metrics.restaurant_id));
    r.insert("buzz_score".to_string(), json!(metrics.buzz_score));
    r.insert("sentiment_score".to_string(), json!(metrics.sentiment_score));
    r.insert("total_mentions".to_string(), json!(metrics.total_mentions));
    r.insert("is_trending".to_string(), json!(metrics.is_trending));
    r.insert("last_updated_at".to_string(), timestamp(&metrics.last_updated_at));
    r
}

pub fn mention_record(mention: &SocialMention) -> Record {
    let mut r = Record::new();
    r.insert("restaurant_id".to_string(), json!(mention.restaurant_id));
    r.insert("source_type".to_string(), json!(mention.source_type.as_str()));
    r.insert("source_url".to_string(), json!(mention.source_url));
    put_text(&mut r, "title", mention.title.as_deref());
    r.insert("raw_text".to_string(), json!(mention.raw_text));
    r.insert("reddit_score".to_string(), json!(mention.reddit_score));
    r.insert(
        "reddit_num_comments".to_string(),
        json!(mention.reddit_num_comments),
    );
    if let Some(s) = mention.sentiment_score.filter(|s| s.is_finite()) {
        r.insert("sentiment_score".to_string(), json!(s));
    }
    put_text(&mut r, "vibe_extracted", mention.vibe_extracted.as_deref());
    put_list(&mut r, "dishes_mentioned", &mention.dishes_mentioned);
    if let Some(posted) = &mention.posted_at {
        r.insert("posted_at".to_string(), timestamp(posted));
    }
    r.insert("scraped_at".to_string(), timestamp(&mention.scraped_at));
    r
}

/// What happened when one group was written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    /// Set when the restaurant row was written.
    pub restaurant_id: Option<String>,
    pub metrics_written: bool,
    pub mentions_written: usize,
    pub errors: Vec<String>,
}

impl PersistOutcome {
    pub fn stored(&self) -> bool {
        self.restaurant_id.is_some()
    }
}

/// Write a finalized group: restaurant, metrics, then each mention.
pub async fn persist_group(
    store: &dyn Store,
    restaurant: &Restaurant,
    scores: Scores,
    mentions: &[GroupedMention],
    now: DateTime<Utc>,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    let restaurant_id = match store
        .upsert(Table::Restaurants, &restaurant_record(restaurant))
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(restaurant = %restaurant.name, "restaurant upsert failed: {:#}", e);
            outcome
                .errors
                .push(format!("Store error for {}: {:#}", restaurant.name, e));
            return outcome;
        }
    };
    outcome.restaurant_id = Some(restaurant_id.clone());

    let metrics = scores.into_metrics(&restaurant_id, now);
    match store
        .upsert(Table::RestaurantMetrics, &metrics_record(&metrics))
        .await
    {
        Ok(_) => outcome.metrics_written = true,
        Err(e) => {
            warn!(restaurant = %restaurant.name, "metrics upsert failed: {:#}", e);
            outcome
                .errors
                .push(format!("Metrics error for {}: {:#}", restaurant.name, e));
        }
    }

    for grouped in mentions {
        let mention = SocialMention::from_grouped(grouped, &restaurant_id, now);
        match store
            .upsert(Table::SocialMentions, &mention_record(&mention))
            .await
        {
            Ok(_) => outcome.mentions_written += 1,
            Err(e) => {
                warn!(url = %mention.source_url, "mention upsert failed: {:#}", e);
                outcome
                    .errors
                    .push(format!("Mention error for {}: {:#}", mention.source_url, e));
            }
        }
    }

    debug!(
        restaurant = %restaurant.name,
        id = %restaurant_id,
        mentions = outcome.mentions_written,
        "group persisted"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::score;
    use crate::models::{
        ContentItem, ExtractedMention, MentionGroup, MentionOrigin, ResolutionKey, SourceKind,
    };
    use crate::store::memory::InMemoryStore;

    fn group() -> MentionGroup {
        let mut item = ContentItem::new("Seven Lives forever", SourceKind::Social);
        item.meta.url = Some("https://reddit.com/r/FoodToronto/1".to_string());
        item.meta.score = Some(12);
        let mut other = ContentItem::new("Seven Lives again", SourceKind::Blog);
        other.meta.url = Some("https://blog.example/seven".to_string());
        MentionGroup {
            key: ResolutionKey::Name("seven lives".to_string()),
            place: None,
            mentions: vec![
                GroupedMention {
                    mention: ExtractedMention::named("Seven Lives").with_sentiment(9.0),
                    origin: MentionOrigin::from_item(&item, 5000),
                },
                GroupedMention {
                    mention: ExtractedMention::named("Seven Lives"),
                    origin: MentionOrigin::from_item(&other, 5000),
                },
            ],
        }
    }

    fn seven_lives() -> Restaurant {
        Restaurant {
            name: "Seven Lives".to_string(),
            slug: "seven-lives".to_string(),
            name_key: "seven lives".to_string(),
            city: "Toronto".to_string(),
            price_tier: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_restaurant_record_strips_absent_values() {
        let r = restaurant_record(&seven_lives());
        assert!(!r.contains_key("address"));
        assert!(!r.contains_key("latitude"));
        assert!(!r.contains_key("google_place_id"));
        assert!(!r.contains_key("embedding"));
        assert!(!r.contains_key("cuisine_tags"));
        assert!(r.values().all(|v| !v.is_null()));
        assert_eq!(r["slug"], "seven-lives");
        assert_eq!(r["name_key"], "seven lives");
    }

    #[test]
    fn test_restaurant_record_embedding_is_array() {
        let mut r = seven_lives();
        r.embedding = Some(vec![0.5, -0.25]);
        let rec = restaurant_record(&r);
        assert_eq!(rec["embedding"], json!([0.5, -0.25]));
    }

    #[test]
    fn test_mention_record_renders_enum_and_timestamps() {
        let g = group();
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let m = SocialMention::from_grouped(&g.mentions[0], "r-1", now);
        let rec = mention_record(&m);
        assert_eq!(rec["source_type"], "social");
        assert_eq!(rec["scraped_at"], "2024-05-01T12:00:00Z");
        assert_eq!(rec["reddit_score"], 12);
        assert_eq!(rec["sentiment_score"], 9.0);
        assert!(!rec.contains_key("posted_at"));
    }

    #[tokio::test]
    async fn test_persist_group_writes_all_entities() {
        let store = InMemoryStore::new();
        let g = group();
        let out = persist_group(&store, &seven_lives(), score(&g), &g.mentions, Utc::now()).await;

        assert!(out.stored());
        assert!(out.metrics_written);
        assert_eq!(out.mentions_written, 2);
        assert!(out.errors.is_empty());
        assert_eq!(store.count(Table::Restaurants), 1);
        assert_eq!(store.count(Table::RestaurantMetrics), 1);
        assert_eq!(store.count(Table::SocialMentions), 2);
    }

    #[tokio::test]
    async fn test_persist_group_is_idempotent() {
        let store = InMemoryStore::new();
        let g = group();
        let first = persist_group(&store, &seven_lives(), score(&g), &g.mentions, Utc::now()).await;
        let second = persist_group(&store, &seven_lives(), score(&g), &g.mentions, Utc::now()).await;

        assert_eq!(first.restaurant_id, second.restaurant_id);
        assert_eq!(store.count(Table::Restaurants), 1);
        assert_eq!(store.count(Table::RestaurantMetrics), 1);
        assert_eq!(store.count(Table::SocialMentions), 2);
    }

    #[tokio::test]
    async fn test_restaurant_failure_skips_dependents() {
        let store = InMemoryStore::new();
        store.fail_table(Table::Restaurants);
        let g = group();
        let out = persist_group(&store, &seven_lives(), score(&g), &g.mentions, Utc::now()).await;

        assert!(!out.stored());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(store.attempts(Table::RestaurantMetrics), 0);
        assert_eq!(store.attempts(Table::SocialMentions), 0);
    }

    #[tokio::test]
    async fn test_metrics_failure_still_writes_mentions() {
        let store = InMemoryStore::new();
        store.fail_table(Table::RestaurantMetrics);
        let g = group();
        let out = persist_group(&store, &seven_lives(), score(&g), &g.mentions, Utc::now()).await;

        assert!(out.stored());
        assert!(!out.metrics_written);
        assert_eq!(out.mentions_written, 2);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].starts_with("Metrics error for Seven Lives"));
    }
}
