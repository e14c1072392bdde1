//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Rows live in a `Vec` per table behind `std::sync::RwLock`. Lookups are
//! linear scans, which is fine for the few hundred rows a run produces.
//! Writes can be made to fail on purpose, per table, to exercise the
//! orchestrator's partial-failure handling.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{text_field, Record, Store, Table};

struct Row {
    id: String,
    fields: Record,
}

#[derive(Debug, Clone, Copy)]
enum FailRule {
    Always,
    Nth(usize),
}

/// In-memory store.
pub struct InMemoryStore {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    attempts: RwLock<HashMap<Table, usize>>,
    failures: RwLock<HashMap<Table, FailRule>>,
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            attempts: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
        }
    }

    /// Make every write to `table` fail.
    pub fn fail_table(&self, table: Table) {
        if let Ok(mut f) = self.failures.write() {
            f.insert(table, FailRule::Always);
        }
    }

    /// Make only the `n`-th (0-based) write attempt to `table` fail.
    pub fn fail_nth(&self, table: Table, n: usize) {
        if let Ok(mut f) = self.failures.write() {
            f.insert(table, FailRule::Nth(n));
        }
    }

    /// Snapshot of a table's rows, each with its `id` field filled in.
    pub fn rows(&self, table: Table) -> Vec<Record> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .map(|r| {
                        let mut rec = r.fields.clone();
                        rec.insert("id".to_string(), Value::String(r.id.clone()));
                        rec
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.tables
            .read()
            .map(|t| t.get(&table).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// First row whose `field` is the string `value`.
    pub fn find(&self, table: Table, field: &str, value: &str) -> Option<Record> {
        self.rows(table)
            .into_iter()
            .find(|r| r.get(field).and_then(Value::as_str) == Some(value))
    }

    /// Number of write attempts made against `table`, failed ones included.
    pub fn attempts(&self, table: Table) -> usize {
        self.attempts
            .read()
            .map(|a| a.get(&table).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn next_attempt(&self, table: Table) -> Result<usize> {
        let mut attempts = self.attempts.write().map_err(poisoned)?;
        let counter = attempts.entry(table).or_insert(0);
        let current = *counter;
        *counter += 1;
        Ok(current)
    }

    fn should_fail(&self, table: Table, attempt: usize) -> Result<bool> {
        let failures = self.failures.read().map_err(poisoned)?;
        Ok(match failures.get(&table) {
            Some(FailRule::Always) => true,
            Some(FailRule::Nth(n)) => *n == attempt,
            None => false,
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_restaurant(rows: &[Row], fields: &Record) -> Option<usize> {
    if let Some(place_id) = text_field(fields, "google_place_id") {
        if let Some(idx) = rows
            .iter()
            .position(|r| text_field(&r.fields, "google_place_id") == Some(place_id))
        {
            return Some(idx);
        }
    }
    let name_key = text_field(fields, "name_key")?;
    rows.iter().position(|r| {
        text_field(&r.fields, "google_place_id").is_none()
            && text_field(&r.fields, "name_key") == Some(name_key)
    })
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(&self, table: Table, record: &Record) -> Result<String> {
        let attempt = self.next_attempt(table)?;
        if self.should_fail(table, attempt)? {
            bail!("simulated write failure on {}", table);
        }

        let fields = table.filter(record);
        let key = table.conflict_key();

        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table).or_default();

        let existing = match table {
            Table::Restaurants => {
                if text_field(&fields, "slug").is_none() {
                    bail!("restaurant record has no slug");
                }
                find_restaurant(rows, &fields)
            }
            _ => {
                let value = text_field(&fields, key)
                    .ok_or_else(|| anyhow!("{} record missing {}", table, key))?;
                rows.iter()
                    .position(|r| text_field(&r.fields, key) == Some(value))
            }
        };

        match existing.and_then(|idx| rows.get_mut(idx)) {
            Some(row) => {
                for (k, v) in fields {
                    row.fields.insert(k, v);
                }
                Ok(row.id.clone())
            }
            None => {
                let id = match table {
                    Table::RestaurantMetrics => text_field(&fields, key)
                        .map(str::to_string)
                        .ok_or_else(|| anyhow!("{} record missing {}", table, key))?,
                    _ => uuid::Uuid::new_v4().to_string(),
                };
                rows.push(Row {
                    id: id.clone(),
                    fields,
                });
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn restaurant(slug: &str, place_id: Option<&str>) -> Record {
        let mut r = Record::new();
        r.insert("name".to_string(), json!(slug));
        r.insert("slug".to_string(), json!(slug));
        r.insert("name_key".to_string(), json!(slug.replace('-', " ")));
        if let Some(id) = place_id {
            r.insert("google_place_id".to_string(), json!(id));
        }
        r
    }

    #[tokio::test]
    async fn test_place_id_conflict_updates() {
        let store = InMemoryStore::new();
        let a = store
            .upsert(Table::Restaurants, &restaurant("pai", Some("ChIJpai")))
            .await
            .unwrap();
        let b = store
            .upsert(Table::Restaurants, &restaurant("pai-thai", Some("ChIJpai")))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.count(Table::Restaurants), 1);
        let row = store.find(Table::Restaurants, "id", &a).unwrap();
        assert_eq!(row["slug"], "pai-thai");
    }

    #[tokio::test]
    async fn test_name_keyed_row_is_reused_then_promoted() {
        let store = InMemoryStore::new();
        let first = store
            .upsert(Table::Restaurants, &restaurant("sugo", None))
            .await
            .unwrap();
        let again = store
            .upsert(Table::Restaurants, &restaurant("sugo", None))
            .await
            .unwrap();
        assert_eq!(first, again);

        let promoted = store
            .upsert(Table::Restaurants, &restaurant("sugo", Some("ChIJsugo")))
            .await
            .unwrap();
        assert_eq!(first, promoted);
        assert_eq!(store.count(Table::Restaurants), 1);

        // A different place with the same slug gets its own row.
        let other = store
            .upsert(Table::Restaurants, &restaurant("sugo", Some("ChIJother")))
            .await
            .unwrap();
        assert_ne!(first, other);
        assert_eq!(store.count(Table::Restaurants), 2);
    }

    #[tokio::test]
    async fn test_shared_slug_with_different_name_keys_stays_apart() {
        let store = InMemoryStore::new();
        let mut spaced = restaurant("seven-lives", None);
        spaced.insert("name_key".to_string(), json!("seven lives"));
        let mut hyphenated = restaurant("seven-lives", None);
        hyphenated.insert("name_key".to_string(), json!("seven-lives"));

        let a = store.upsert(Table::Restaurants, &spaced).await.unwrap();
        let b = store.upsert(Table::Restaurants, &hyphenated).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count(Table::Restaurants), 2);

        assert_eq!(store.upsert(Table::Restaurants, &spaced).await.unwrap(), a);
        assert_eq!(store.upsert(Table::Restaurants, &hyphenated).await.unwrap(), b);
        assert_eq!(store.count(Table::Restaurants), 2);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_existing_fields() {
        let store = InMemoryStore::new();
        let mut full = restaurant("pai", Some("ChIJpai"));
        full.insert("photo_url".to_string(), json!("https://img/pai.jpg"));
        let id = store.upsert(Table::Restaurants, &full).await.unwrap();

        let mut sparse = restaurant("pai", Some("ChIJpai"));
        sparse.insert("photo_url".to_string(), Value::Null);
        store.upsert(Table::Restaurants, &sparse).await.unwrap();

        let row = store.find(Table::Restaurants, "id", &id).unwrap();
        assert_eq!(row["photo_url"], "https://img/pai.jpg");
    }

    #[tokio::test]
    async fn test_metrics_keyed_by_restaurant() {
        let store = InMemoryStore::new();
        let mut m = Record::new();
        m.insert("restaurant_id".to_string(), json!("r-1"));
        m.insert("buzz_score".to_string(), json!(9.0));
        assert_eq!(store.upsert(Table::RestaurantMetrics, &m).await.unwrap(), "r-1");

        m.insert("buzz_score".to_string(), json!(10.5));
        store.upsert(Table::RestaurantMetrics, &m).await.unwrap();
        assert_eq!(store.count(Table::RestaurantMetrics), 1);
        assert_eq!(store.rows(Table::RestaurantMetrics)[0]["buzz_score"], 10.5);
    }

    #[tokio::test]
    async fn test_missing_conflict_key_is_error() {
        let store = InMemoryStore::new();
        let mut m = Record::new();
        m.insert("title".to_string(), json!("no url"));
        assert!(store.upsert(Table::SocialMentions, &m).await.is_err());
        assert_eq!(store.count(Table::SocialMentions), 0);
    }

    #[tokio::test]
    async fn test_fail_nth_only_fails_once() {
        let store = InMemoryStore::new();
        store.fail_nth(Table::Restaurants, 1);
        assert!(store
            .upsert(Table::Restaurants, &restaurant("a", None))
            .await
            .is_ok());
        assert!(store
            .upsert(Table::Restaurants, &restaurant("b", None))
            .await
            .is_err());
        assert!(store
            .upsert(Table::Restaurants, &restaurant("c", None))
            .await
            .is_ok());
        assert_eq!(store.count(Table::Restaurants), 2);
        assert_eq!(store.attempts(Table::Restaurants), 3);
    }
}
