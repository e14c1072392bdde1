use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Canonical restaurants. List columns hold JSON arrays; the embedding is
    // a little-endian f32 blob.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS restaurants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            name_key TEXT,
            address TEXT,
            city TEXT,
            latitude REAL,
            longitude REAL,
            price_tier INTEGER NOT NULL DEFAULT 2 CHECK (price_tier BETWEEN 1 AND 4),
            photo_url TEXT,
            vibe TEXT,
            google_place_id TEXT UNIQUE,
            google_maps_url TEXT,
            google_rating REAL,
            cuisine_tags TEXT,
            recommended_dishes TEXT,
            embedding BLOB,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS restaurant_metrics (
            restaurant_id TEXT PRIMARY KEY,
            buzz_score REAL NOT NULL,
            sentiment_score REAL NOT NULL,
            total_mentions INTEGER NOT NULL,
            is_trending INTEGER NOT NULL,
            last_updated_at TEXT NOT NULL,
            FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS social_mentions (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT NOT NULL,
            source_type TEXT NOT NULL CHECK (source_type IN ('social', 'blog')),
            source_url TEXT NOT NULL UNIQUE,
            title TEXT,
            raw_text TEXT NOT NULL,
            reddit_score INTEGER NOT NULL DEFAULT 0,
            reddit_num_comments INTEGER NOT NULL DEFAULT 0,
            sentiment_score REAL,
            vibe_extracted TEXT,
            dishes_mentioned TEXT,
            posted_at TEXT,
            scraped_at TEXT NOT NULL,
            FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Place lookups that succeeded, keyed by normalized name and city.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS place_cache (
            name_key TEXT NOT NULL,
            city TEXT NOT NULL,
            place_id TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            rating REAL,
            price_level INTEGER,
            maps_url TEXT,
            photo_url TEXT,
            cached_at TEXT NOT NULL,
            PRIMARY KEY (name_key, city)
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_column_if_missing(pool, "restaurants", "name_key", "TEXT").await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_restaurants_slug ON restaurants(slug)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_restaurants_name_key ON restaurants(name_key)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metrics_buzz ON restaurant_metrics(buzz_score DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mentions_restaurant ON social_mentions(restaurant_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Databases created before a column existed get it added in place.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<()> {
    let present: Vec<String> =
        sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(pool)
            .await?;
    if !present.iter().any(|c| c == column) {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))
            .execute(pool)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_upgrades_restaurants_without_name_key() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&dir.path().join("old.sqlite")).await.unwrap();
        sqlx::query(
            "CREATE TABLE restaurants (id TEXT PRIMARY KEY, name TEXT NOT NULL, \
             slug TEXT NOT NULL, google_place_id TEXT UNIQUE, \
             created_at TEXT NOT NULL, updated_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('restaurants')")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(columns.iter().any(|c| c == "name_key"));
        pool.close().await;
    }
}
