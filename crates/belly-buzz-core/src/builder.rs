//! Canonical record builder.
//!
//! Merges a [`MentionGroup`] into one [`Restaurant`]: descriptive fields
//! come from the group's PlaceMatch when there is one, otherwise from the
//! first mention. The embedding is attached later, just before persistence.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::{MentionGroup, ResolutionKey, Restaurant};
use crate::normalize::{normalize_name, slug};
use crate::traits::EMPTY_EMBEDDING_FALLBACK;

/// Price tier used when neither the place nor any mention says otherwise.
pub const DEFAULT_PRICE_TIER: i64 = 2;

/// Build the canonical restaurant for a group (embedding left empty).
pub fn build(group: &MentionGroup, city: &str) -> Restaurant {
    let place = group.place.as_ref();

    let name = match place {
        Some(p) if !p.name.trim().is_empty() => p.name.trim().to_string(),
        _ => group
            .first()
            .map(|m| m.name.trim().to_string())
            .unwrap_or_default(),
    };

    let vibe = group
        .mentions
        .iter()
        .filter_map(|m| m.mention.vibe.as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string);

    let name_key = match &group.key {
        ResolutionKey::Name(key) => key.clone(),
        ResolutionKey::Place(_) => group
            .first()
            .map(|m| normalize_name(&m.name))
            .unwrap_or_default(),
    };

    let mut slug_value = slug(&name);
    if slug_value.is_empty() {
        slug_value = fallback_slug(&group.key);
    }

    Restaurant {
        id: None,
        slug: slug_value,
        name_key,
        name,
        address: place.map(|p| p.address.clone()).unwrap_or_default(),
        city: city.to_string(),
        latitude: place.map(|p| p.latitude).unwrap_or(0.0),
        longitude: place.map(|p| p.longitude).unwrap_or(0.0),
        price_tier: price_tier(group),
        photo_url: place.and_then(|p| p.photo_url.clone()),
        vibe,
        google_place_id: place.map(|p| p.place_id.clone()),
        google_maps_url: place.and_then(|p| p.maps_url.clone()),
        google_rating: place.and_then(|p| p.rating),
        cuisine_tags: merge_lists(group.mentions.iter().map(|m| &m.mention.cuisine_tags)),
        recommended_dishes: merge_lists(
            group
                .mentions
                .iter()
                .map(|m| &m.mention.recommended_dishes),
        ),
        embedding: None,
    }
}

/// Text sent to the embedder for a restaurant.
///
/// Joins name, vibe, cuisine tags, and dishes with `". "`, skipping empty
/// parts. Never returns an empty string.
pub fn embedding_text(restaurant: &Restaurant) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !restaurant.name.trim().is_empty() {
        parts.push(restaurant.name.trim().to_string());
    }
    if let Some(vibe) = restaurant.vibe.as_deref().map(str::trim) {
        if !vibe.is_empty() {
            parts.push(vibe.to_string());
        }
    }
    if !restaurant.cuisine_tags.is_empty() {
        parts.push(restaurant.cuisine_tags.join(", "));
    }
    if !restaurant.recommended_dishes.is_empty() {
        parts.push(format!(
            "dishes: {}",
            restaurant.recommended_dishes.join(", ")
        ));
    }

    let combined = parts.join(". ");
    if !combined.trim().is_empty() {
        combined
    } else if !restaurant.name.trim().is_empty() {
        restaurant.name.clone()
    } else {
        EMPTY_EMBEDDING_FALLBACK.to_string()
    }
}

/// Map a free-form price mention (`"$$"`, `"cheap eats"`) to a 1–4 tier.
pub fn price_tier_from_hint(hint: &str) -> Option<i64> {
    let h = hint.trim().to_lowercase();

    let dollars = h.chars().filter(|c| *c == '$').count();
    if dollars > 0 {
        return Some((dollars as i64).clamp(1, 4));
    }

    if h.contains("inexpensive") || h.contains("cheap") || h.contains("budget") {
        Some(1)
    } else if h.contains("very expensive") || h.contains("luxury") || h.contains("splurge") {
        Some(4)
    } else if h.contains("expensive") || h.contains("pricey") || h.contains("upscale") {
        Some(3)
    } else if h.contains("moderate") || h.contains("mid") || h.contains("reasonable") {
        Some(2)
    } else {
        None
    }
}

fn price_tier(group: &MentionGroup) -> i64 {
    if let Some(level) = group.place.as_ref().and_then(|p| p.price_level) {
        return level.clamp(1, 4);
    }
    group
        .mentions
        .iter()
        .filter_map(|m| m.mention.price_hint.as_deref())
        .find_map(price_tier_from_hint)
        .unwrap_or(DEFAULT_PRICE_TIER)
}

/// Union of string lists in first-seen order, case-insensitive.
fn merge_lists<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for item in list {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_lowercase()) {
                out.push(trimmed.to_string());
            }
        }
    }
    out
}

fn fallback_slug(key: &ResolutionKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("restaurant-{}", &digest[..8])
}
