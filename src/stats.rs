//! Database statistics.
//!
//! Used by `buzz stats` to check that runs are landing: restaurant and
//! mention counts, enrichment coverage, and the current buzz leaders.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

const TOP_N: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DbStats {
    pub restaurants: i64,
    pub with_place_id: i64,
    pub with_embedding: i64,
    pub metrics_rows: i64,
    pub trending: i64,
    /// `(source_type, count)`, largest first.
    pub mentions_by_source: Vec<(String, i64)>,
    pub top: Vec<TopRestaurant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopRestaurant {
    pub name: String,
    pub buzz_score: f64,
    pub total_mentions: i64,
    pub is_trending: bool,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<DbStats> {
    let restaurants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants")
        .fetch_one(pool)
        .await?;
    let with_place_id: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM restaurants WHERE google_place_id IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let with_embedding: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM restaurants WHERE embedding IS NOT NULL")
            .fetch_one(pool)
            .await?;
    let metrics_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurant_metrics")
        .fetch_one(pool)
        .await?;
    let trending: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM restaurant_metrics WHERE is_trending = 1")
            .fetch_one(pool)
            .await?;

    let mentions_by_source = sqlx::query(
        "SELECT source_type, COUNT(*) AS n FROM social_mentions \
         GROUP BY source_type ORDER BY n DESC, source_type",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| (row.get::<String, _>("source_type"), row.get::<i64, _>("n")))
    .collect();

    let top = sqlx::query(
        r#"
        SELECT r.name, m.buzz_score, m.total_mentions, m.is_trending
        FROM restaurant_metrics m
        JOIN restaurants r ON r.id = m.restaurant_id
        ORDER BY m.buzz_score DESC, r.name
        LIMIT ?
        "#,
    )
    .bind(TOP_N)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| TopRestaurant {
        name: row.get("name"),
        buzz_score: row.get("buzz_score"),
        total_mentions: row.get("total_mentions"),
        is_trending: row.get::<i64, _>("is_trending") != 0,
    })
    .collect();

    Ok(DbStats {
        restaurants,
        with_place_id,
        with_embedding,
        metrics_rows,
        trending,
        mentions_by_source,
        top,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await;
    pool.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Belly Buzz — Database Stats");
    println!("===========================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Restaurants:  {}", stats.restaurants);
    println!(
        "  With place:   {} ({}%)",
        stats.with_place_id,
        percent(stats.with_place_id, stats.restaurants)
    );
    println!(
        "  Embedded:     {} ({}%)",
        stats.with_embedding,
        percent(stats.with_embedding, stats.restaurants)
    );
    println!("  Metrics rows: {}", stats.metrics_rows);
    println!("  Trending:     {}", stats.trending);

    if !stats.mentions_by_source.is_empty() {
        println!();
        println!("  Mentions by source:");
        for (source, n) in &stats.mentions_by_source {
            println!("    {:<10} {:>6}", source, n);
        }
    }

    if !stats.top.is_empty() {
        println!();
        println!("  {:<36} {:>8} {:>9}   {}", "TOP BY BUZZ", "BUZZ", "MENTIONS", "TRENDING");
        println!("  {}", "-".repeat(68));
        for r in &stats.top {
            println!(
                "  {:<36} {:>8.2} {:>9}   {}",
                r.name,
                r.buzz_score,
                r.total_mentions,
                if r.is_trending { "yes" } else { "" }
            );
        }
    }
    println!();

    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
