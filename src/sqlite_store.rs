//! SQLite-backed [`Store`] implementation.
//!
//! Builds each statement from the table's column whitelist and the fields
//! present in the record, so a sparse record only touches its own columns.
//! `restaurant_metrics` and `social_mentions` use `INSERT … ON CONFLICT DO
//! UPDATE` on their conflict key. `restaurants` follows the identity rule
//! documented on [`belly_buzz_core::store`] inside one immediate
//! transaction, so concurrent finalizers queue on the write lock.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteArguments;
use sqlx::query::Query;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use belly_buzz_core::store::{text_field, Record, Store, Table};

use crate::embedding::vec_to_blob;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Identity lookup and write share one `BEGIN IMMEDIATE` transaction:
    /// the write lock is taken before the first read, so `busy_timeout`
    /// covers contention between concurrent finalizers.
    async fn upsert_restaurant(&self, fields: &Record) -> Result<String> {
        if text_field(fields, "slug").is_none() {
            bail!("restaurant record has no slug");
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let written = match write_restaurant(&mut *conn, fields).await {
            Ok(id) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| id)
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        if written.is_err() {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!("rollback of restaurant upsert failed: {}", e);
            }
        }
        written
    }

    async fn upsert_keyed(&self, table: Table, fields: &Record) -> Result<String> {
        let key = table.conflict_key();
        let key_value = text_field(fields, key)
            .ok_or_else(|| anyhow!("{} record missing {}", table, key))?
            .to_string();

        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != key)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let result = match table {
            Table::RestaurantMetrics => {
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
                    table.name(),
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", "),
                    key,
                    on_conflict
                );
                let mut q = sqlx::query(&sql);
                for (column, value) in fields {
                    q = bind_value(q, column, value);
                }
                q.execute(&self.pool).await?;
                key_value
            }
            Table::SocialMentions => {
                let sql = format!(
                    "INSERT INTO {} (id, {}) VALUES (?, {}) ON CONFLICT({}) {}",
                    table.name(),
                    columns.join(", "),
                    vec!["?"; columns.len()].join(", "),
                    key,
                    on_conflict
                );
                let mut q = sqlx::query(&sql).bind(Uuid::new_v4().to_string());
                for (column, value) in fields {
                    q = bind_value(q, column, value);
                }
                q.execute(&self.pool).await?;

                let select = format!("SELECT id FROM {} WHERE {} = ?", table.name(), key);
                sqlx::query_scalar::<_, String>(&select)
                    .bind(&key_value)
                    .fetch_one(&self.pool)
                    .await?
            }
            Table::Restaurants => bail!("restaurants are not keyed by a single column"),
        };

        Ok(result)
    }
}

async fn write_restaurant(conn: &mut SqliteConnection, fields: &Record) -> Result<String> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut existing: Option<String> = None;
    if let Some(place_id) = text_field(fields, "google_place_id") {
        existing = sqlx::query_scalar("SELECT id FROM restaurants WHERE google_place_id = ?")
            .bind(place_id)
            .fetch_optional(&mut *conn)
            .await?;
    }
    if existing.is_none() {
        if let Some(name_key) = text_field(fields, "name_key") {
            existing = sqlx::query_scalar(
                "SELECT id FROM restaurants WHERE name_key = ? AND google_place_id IS NULL \
                 ORDER BY created_at LIMIT 1",
            )
            .bind(name_key)
            .fetch_optional(&mut *conn)
            .await?;
        }
    }

    let columns: Vec<&str> = fields.keys().map(String::as_str).collect();

    match existing {
        Some(id) => {
            let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
            let sql = format!(
                "UPDATE restaurants SET {}, updated_at = ? WHERE id = ?",
                assignments.join(", ")
            );
            let mut q = sqlx::query(&sql);
            for (column, value) in fields {
                q = bind_value(q, column, value);
            }
            q.bind(&now).bind(&id).execute(&mut *conn).await?;
            Ok(id)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            let sql = format!(
                "INSERT INTO restaurants (id, {}, created_at, updated_at) VALUES (?, {}, ?, ?)",
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            let mut q = sqlx::query(&sql).bind(&id);
            for (column, value) in fields {
                q = bind_value(q, column, value);
            }
            q.bind(&now).bind(&now).execute(&mut *conn).await?;
            Ok(id)
        }
    }
}

/// Bind one JSON value with the SQLite type its column expects.
fn bind_value<'q>(
    q: Query<'q, Sqlite, SqliteArguments<'q>>,
    column: &str,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => q.bind(None::<String>),
        Value::Bool(b) => q.bind(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => q.bind(i),
            None => q.bind(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => q.bind(s.clone()),
        Value::Array(items) if column == "embedding" => {
            let floats: Vec<f32> = items
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            q.bind(vec_to_blob(&floats))
        }
        other => q.bind(other.to_string()),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, table: Table, record: &Record) -> Result<String> {
        let fields = table.filter(record);
        match table {
            Table::Restaurants => self.upsert_restaurant(&fields).await,
            _ => self.upsert_keyed(table, &fields).await,
        }
    }
}
