//! Place lookups remembered across runs.
//!
//! [`CachedPlaces`] wraps a [`PlaceLookup`] and consults the `place_cache`
//! table before calling it. Only hits are stored, keyed by the normalized
//! name and the city, so a name the provider could not place is asked
//! again on the next run. Cache reads and writes never fail a lookup: a
//! database error is logged and the inner lookup answers instead.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use belly_buzz_core::models::PlaceMatch;
use belly_buzz_core::normalize::normalize_name;
use belly_buzz_core::traits::PlaceLookup;
use belly_buzz_core::CollaboratorError;

pub struct CachedPlaces {
    pool: SqlitePool,
    inner: Box<dyn PlaceLookup>,
}

impl CachedPlaces {
    pub fn new(pool: SqlitePool, inner: Box<dyn PlaceLookup>) -> Self {
        Self { pool, inner }
    }

    async fn get(&self, name_key: &str, city: &str) -> anyhow::Result<Option<PlaceMatch>> {
        let row = sqlx::query(
            "SELECT place_id, name, address, latitude, longitude, rating, price_level, \
             maps_url, photo_url FROM place_cache WHERE name_key = ? AND city = ?",
        )
        .bind(name_key)
        .bind(city)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PlaceMatch {
            place_id: row.get("place_id"),
            name: row.get("name"),
            address: row.get("address"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            rating: row.get("rating"),
            price_level: row.get("price_level"),
            maps_url: row.get("maps_url"),
            photo_url: row.get("photo_url"),
        }))
    }

    async fn put(&self, name_key: &str, city: &str, place: &PlaceMatch) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        sqlx::query(
            "INSERT INTO place_cache (name_key, city, place_id, name, address, latitude, \
             longitude, rating, price_level, maps_url, photo_url, cached_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(name_key, city) DO UPDATE SET \
             place_id = excluded.place_id, name = excluded.name, address = excluded.address, \
             latitude = excluded.latitude, longitude = excluded.longitude, \
             rating = excluded.rating, price_level = excluded.price_level, \
             maps_url = excluded.maps_url, photo_url = excluded.photo_url, \
             cached_at = excluded.cached_at",
        )
        .bind(name_key)
        .bind(city)
        .bind(&place.place_id)
        .bind(&place.name)
        .bind(&place.address)
        .bind(place.latitude)
        .bind(place.longitude)
        .bind(place.rating)
        .bind(place.price_level)
        .bind(place.maps_url.as_deref())
        .bind(place.photo_url.as_deref())
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PlaceLookup for CachedPlaces {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_place(
        &self,
        name: &str,
        city: &str,
    ) -> Result<Option<PlaceMatch>, CollaboratorError> {
        let name_key = normalize_name(name);

        match self.get(&name_key, city).await {
            Ok(Some(place)) => {
                debug!(name = %name, place_id = %place.place_id, "place cache hit");
                return Ok(Some(place));
            }
            Ok(None) => {}
            Err(e) => warn!(name = %name, "place cache read failed: {}", e),
        }

        let found = self.inner.find_place(name, city).await?;
        if let Some(place) = found.as_ref().filter(|p| !p.place_id.trim().is_empty()) {
            if let Err(e) = self.put(&name_key, city, place).await {
                warn!(name = %name, "place cache write failed: {}", e);
            }
        }
        Ok(found)
    }
}
