//! Google Places (v1 `places:searchText`) lookup.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use belly_buzz_core::models::PlaceMatch;
use belly_buzz_core::traits::{NoPlaces, PlaceLookup};
use belly_buzz_core::CollaboratorError;

use crate::config::{secret, EnrichmentConfig, GOOGLE_MAPS_KEY_ENV};
use crate::http;

const SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location,\
places.rating,places.userRatingCount,places.priceLevel,places.googleMapsUri,places.photos";
const PHOTO_MAX_PX: u32 = 400;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    places: Vec<ApiPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlace {
    id: String,
    display_name: Option<LocalizedText>,
    #[serde(default)]
    formatted_address: String,
    location: Option<LatLng>,
    rating: Option<f64>,
    price_level: Option<String>,
    google_maps_uri: Option<String>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct Photo {
    name: String,
}

pub struct GooglePlaces {
    client: reqwest::Client,
    api_key: String,
    bias_latitude: f64,
    bias_longitude: f64,
    bias_radius_m: f64,
    timeout_secs: u64,
}

impl GooglePlaces {
    pub fn new(config: &EnrichmentConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs, http::USER_AGENT)?,
            api_key,
            bias_latitude: config.bias_latitude,
            bias_longitude: config.bias_longitude,
            bias_radius_m: config.bias_radius_m,
            timeout_secs: config.timeout_secs,
        })
    }

    fn photo_url(&self, photo_name: &str) -> String {
        format!(
            "https://places.googleapis.com/v1/{}/media?maxHeightPx={}&maxWidthPx={}&key={}",
            photo_name, PHOTO_MAX_PX, PHOTO_MAX_PX, self.api_key
        )
    }

    fn to_match(&self, place: ApiPlace, queried: &str) -> Option<PlaceMatch> {
        if place.id.trim().is_empty() {
            return None;
        }
        let (latitude, longitude) = place
            .location
            .map(|l| (l.latitude, l.longitude))
            .unwrap_or((0.0, 0.0));
        Some(PlaceMatch {
            place_id: place.id,
            name: place
                .display_name
                .map(|d| d.text)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| queried.to_string()),
            address: place.formatted_address,
            latitude,
            longitude,
            rating: place.rating,
            price_level: place.price_level.as_deref().and_then(price_level),
            maps_url: place.google_maps_uri,
            photo_url: place.photos.first().map(|p| self.photo_url(&p.name)),
        })
    }
}

/// Map the v1 `priceLevel` enum onto the 1–4 tier scale.
fn price_level(level: &str) -> Option<i64> {
    match level {
        "PRICE_LEVEL_FREE" | "PRICE_LEVEL_INEXPENSIVE" => Some(1),
        "PRICE_LEVEL_MODERATE" => Some(2),
        "PRICE_LEVEL_EXPENSIVE" => Some(3),
        "PRICE_LEVEL_VERY_EXPENSIVE" => Some(4),
        _ => None,
    }
}

#[async_trait]
impl PlaceLookup for GooglePlaces {
    fn name(&self) -> &str {
        "google"
    }

    async fn find_place(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<PlaceMatch>, CollaboratorError> {
        let body = serde_json::json!({
            "textQuery": format!("{} {}", name, city),
            "maxResultCount": 1,
            "locationBias": {
                "circle": {
                    "center": { "latitude": self.bias_latitude, "longitude": self.bias_longitude },
                    "radius": self.bias_radius_m,
                }
            }
        });

        let response = self
            .client
            .post(SEARCH_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(http::api_error(response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| http::transport_error(e, self.timeout_secs))?;

        let found = parsed
            .places
            .into_iter()
            .next()
            .and_then(|p| self.to_match(p, name));
        if found.is_none() {
            debug!(query = %name, "no place found");
        }
        Ok(found)
    }
}

/// Build the place lookup named by the config.
///
/// `google` without `GOOGLE_MAPS_API_KEY` degrades to [`NoPlaces`] with a
/// warning: every mention then resolves by name.
pub fn create_place_lookup(config: &EnrichmentConfig) -> Result<Box<dyn PlaceLookup>> {
    match config.provider.as_str() {
        "google" => match secret(GOOGLE_MAPS_KEY_ENV) {
            Some(key) => Ok(Box::new(GooglePlaces::new(config, key)?)),
            None => {
                warn!("{} not set; place enrichment disabled", GOOGLE_MAPS_KEY_ENV);
                Ok(Box::new(NoPlaces))
            }
        },
        "disabled" => Ok(Box::new(NoPlaces)),
        other => anyhow::bail!("Unknown enrichment provider: {}", other),
    }
}
