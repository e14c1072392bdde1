//! Buzz and sentiment scoring for a [`MentionGroup`].
//!
//! Scoring is pure: the same group always produces bit-identical floats.
//! The only wall-clock value, `last_updated_at`, is stamped by the caller in
//! [`Scores::into_metrics`].

use chrono::{DateTime, Utc};

use crate::models::{clamp_sentiment, MentionGroup, RestaurantMetrics};

/// Sentiment assumed for a mention the extractor could not score.
pub const NEUTRAL_SENTIMENT: f64 = 6.0;

/// Mention count at which a restaurant is flagged as trending.
pub const TRENDING_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub buzz_score: f64,
    pub sentiment_score: f64,
    pub total_mentions: u32,
    pub is_trending: bool,
}

impl Scores {
    pub fn into_metrics(self, restaurant_id: &str, now: DateTime<Utc>) -> RestaurantMetrics {
        RestaurantMetrics {
            restaurant_id: restaurant_id.to_string(),
            buzz_score: self.buzz_score,
            sentiment_score: self.sentiment_score,
            total_mentions: self.total_mentions,
            is_trending: self.is_trending,
            last_updated_at: now,
        }
    }
}

/// Buzz from mention volume and average sentiment.
///
/// Monotonically non-decreasing in both inputs and never negative.
pub fn buzz(mention_count: u32, average_sentiment: f64) -> f64 {
    mention_count as f64 + average_sentiment.max(0.0)
}

/// Score a group. Groups reaching this point are non-empty.
pub fn score(group: &MentionGroup) -> Scores {
    let total_mentions = group.mentions.len() as u32;

    let sentiment_score = if total_mentions == 0 {
        NEUTRAL_SENTIMENT
    } else {
        let sum: f64 = group
            .mentions
            .iter()
            .map(|m| {
                m.mention
                    .sentiment
                    .and_then(clamp_sentiment)
                    .unwrap_or(NEUTRAL_SENTIMENT)
            })
            .sum();
        sum / total_mentions as f64
    };

    Scores {
        buzz_score: buzz(total_mentions, sentiment_score),
        sentiment_score,
        total_mentions,
        is_trending: total_mentions >= TRENDING_THRESHOLD,
    }
}
