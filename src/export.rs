//! JSON export consumed by the frontend.
//!
//! ```json
//! {
//!   "date": "2024-06-01T12:00:00Z",
//!   "restaurants": [
//!     { "id": "pai-northern-thai-kitchen", "name": "Pai Northern Thai Kitchen",
//!       "buzz_score": 10.5, "sentiment": 8.5, "mentions": 2,
//!       "summary": "Northern Thai comfort staples.",
//!       "location": { "lat": 43.6479, "lng": -79.3889, "address": "18 Duncan St" },
//!       "sources": ["mock:reddit"] }
//!   ]
//! }
//! ```
//!
//! Field names and their order are fixed; the frontend reads them as-is.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use belly_buzz_core::metrics::Scores;
use belly_buzz_core::models::{MentionGroup, Restaurant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRestaurant {
    /// The restaurant slug.
    pub id: String,
    pub name: String,
    pub buzz_score: f64,
    pub sentiment: f64,
    pub mentions: u32,
    pub summary: String,
    pub location: Option<Location>,
    pub sources: Vec<String>,
}

impl RankedRestaurant {
    pub fn new(restaurant: &Restaurant, scores: &Scores, group: &MentionGroup) -> Self {
        let summary = group
            .mentions
            .iter()
            .find_map(|m| {
                m.mention
                    .vibe
                    .as_deref()
                    .or(m.origin.title.as_deref())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("Trending on {} food feeds", restaurant.city));

        let location = restaurant.has_location().then(|| Location {
            lat: restaurant.latitude,
            lng: restaurant.longitude,
            address: Some(restaurant.address.clone()).filter(|a| !a.trim().is_empty()),
        });

        let sources: BTreeSet<String> = group.mentions.iter().map(|m| m.origin.label.clone()).collect();

        Self {
            id: restaurant.slug.clone(),
            name: restaurant.name.clone(),
            buzz_score: round_to(scores.buzz_score, 2),
            sentiment: round_to(scores.sentiment_score, 1),
            mentions: scores.total_mentions,
            summary,
            location,
            sources: sources.into_iter().collect(),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Serialize)]
struct ExportDocument<'a> {
    date: String,
    restaurants: &'a [RankedRestaurant],
}

/// Order by buzz, highest first. Ties keep their processing order.
pub fn rank(restaurants: &mut [RankedRestaurant]) {
    restaurants.sort_by(|a, b| b.buzz_score.total_cmp(&a.buzz_score));
}

/// Suffix repeated ids with `-2`, `-3`, … in order of appearance.
///
/// Distinct restaurants can share a slug; the frontend keys entries by id.
pub fn unique_ids(restaurants: &mut [RankedRestaurant]) {
    let original: HashSet<String> = restaurants.iter().map(|r| r.id.clone()).collect();
    let mut used: HashSet<String> = HashSet::new();
    for r in restaurants.iter_mut() {
        if used.insert(r.id.clone()) {
            continue;
        }
        let mut n = 2;
        let id = loop {
            let candidate = format!("{}-{}", r.id, n);
            if !original.contains(&candidate) && !used.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        used.insert(id.clone());
        r.id = id;
    }
}

/// Render the export document.
pub fn render(restaurants: &[RankedRestaurant], date: DateTime<Utc>) -> Result<String> {
    let mut ranked = restaurants.to_vec();
    unique_ids(&mut ranked);
    rank(&mut ranked);
    let doc = ExportDocument {
        date: date.to_rfc3339_opts(SecondsFormat::Secs, true),
        restaurants: &ranked,
    };
    serde_json::to_string_pretty(&doc).context("Failed to serialize export")
}

/// Write the export to `path`, creating parent directories.
pub fn write_export(
    path: &Path,
    restaurants: &[RankedRestaurant],
    date: DateTime<Utc>,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory: {}", parent.display()))?;
    }
    let body = render(restaurants, date)?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write export: {}", path.display()))?;
    info!(path = %path.display(), restaurants = restaurants.len(), "export written");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use belly_buzz_core::metrics::score;
    use belly_buzz_core::models::{
        ContentItem, ExtractedMention, GroupedMention, MentionOrigin, ResolutionKey, SourceKind,
    };

    fn grouped(name: &str, vibe: Option<&str>, title: Option<&str>, label: &str) -> GroupedMention {
        let mut item = ContentItem::new(format!("{} is great", name), SourceKind::Social);
        item.meta.title = title.map(str::to_string);
        item.meta.label = Some(label.to_string());
        let mut mention = ExtractedMention::named(name).with_sentiment(7.0);
        mention.vibe = vibe.map(str::to_string);
        GroupedMention {
            mention,
            origin: MentionOrigin::from_item(&item, 5000),
        }
    }

    fn restaurant(name: &str, slug: &str) -> Restaurant {
        Restaurant {
            name: name.to_string(),
            slug: slug.to_string(),
            city: "Toronto".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_prefers_vibe_then_title() {
        let group = MentionGroup {
            key: ResolutionKey::Name("sugo".to_string()),
            place: None,
            mentions: vec![
                grouped("Sugo", None, Some("Red sauce heaven"), "r/FoodToronto"),
                grouped("Sugo", Some("Classic red-sauce plates"), None, "Toronto Life"),
            ],
        };
        let ranked = RankedRestaurant::new(&restaurant("Sugo", "sugo"), &score(&group), &group);
        assert_eq!(ranked.summary, "Red sauce heaven");
        assert_eq!(ranked.sources, vec!["Toronto Life", "r/FoodToronto"]);
        assert_eq!(ranked.mentions, 2);
        assert!(ranked.location.is_none());
    }

    #[test]
    fn test_summary_default_names_city() {
        let group = MentionGroup {
            key: ResolutionKey::Name("sugo".to_string()),
            place: None,
            mentions: vec![grouped("Sugo", None, None, "mock:reddit")],
        };
        let ranked = RankedRestaurant::new(&restaurant("Sugo", "sugo"), &score(&group), &group);
        assert_eq!(ranked.summary, "Trending on Toronto food feeds");
    }

    #[test]
    fn test_location_when_known() {
        let group = MentionGroup {
            key: ResolutionKey::Place("ChIJpai".to_string()),
            place: None,
            mentions: vec![grouped("Pai", Some("Thai"), None, "mock:reddit")],
        };
        let mut r = restaurant("Pai", "pai");
        r.latitude = 43.6479;
        r.longitude = -79.3889;
        r.address = "18 Duncan St".to_string();
        let ranked = RankedRestaurant::new(&r, &score(&group), &group);
        let loc = ranked.location.unwrap();
        assert_eq!(loc.address.as_deref(), Some("18 Duncan St"));
        assert_eq!(loc.lat, 43.6479);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(8.666_666, 2), 8.67);
        assert_eq!(round_to(6.66, 1), 6.7);
    }

    #[test]
    fn test_render_orders_by_buzz_and_keeps_field_order() {
        let entry = |id: &str, buzz: f64| RankedRestaurant {
            id: id.to_string(),
            name: id.to_string(),
            buzz_score: buzz,
            sentiment: 7.0,
            mentions: 1,
            summary: "s".to_string(),
            location: None,
            sources: vec![],
        };
        let date = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = render(&[entry("a", 8.0), entry("b", 9.5), entry("c", 8.0)], date).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["date"], "2024-06-01T12:00:00Z");
        let ids: Vec<&str> = json["restaurants"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(json["restaurants"][0]["location"].is_null());

        let id_at = body.find("\"id\"").unwrap();
        let sources_at = body.find("\"sources\"").unwrap();
        assert!(id_at < sources_at);
    }

    #[test]
    fn test_unique_ids_suffixes_repeats() {
        let entry = |id: &str| RankedRestaurant {
            id: id.to_string(),
            name: id.to_string(),
            buzz_score: 8.0,
            sentiment: 7.0,
            mentions: 1,
            summary: "s".to_string(),
            location: None,
            sources: vec![],
        };
        let mut entries = vec![
            entry("seven-lives"),
            entry("seven-lives"),
            entry("seven-lives-2"),
            entry("seven-lives"),
            entry("sugo"),
        ];
        unique_ids(&mut entries);

        let ids: Vec<&str> = entries.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["seven-lives", "seven-lives-3", "seven-lives-2", "seven-lives-4", "sugo"]
        );
    }

    #[test]
    fn test_write_export_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("data.json");
        write_export(&path, &[], Utc::now()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["restaurants"].as_array().unwrap().is_empty());
    }
}
