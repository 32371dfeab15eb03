//! In-process backend with exact (brute-force) search.
//!
//! Behaves like the index for the operations this crate uses: same
//! filters, `limit`/`offset` semantics and nearest-first ordering. Distances
//! are squared Euclidean; equal distances keep insertion order.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use sonority_core::model::EntityId;
use sonority_core::{Error, Result};

use super::{Filter, RawHit, Row, SearchRequest, VectorBackend};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection; a no-op if it exists.
    pub fn create_collection(&self, name: &str) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default();
    }

    /// Append a serializable record, creating the collection if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `record` does not serialize to a
    /// JSON object.
    pub fn insert<T: Serialize>(&self, collection: &str, record: &T) -> Result<()> {
        match serde_json::to_value(record) {
            Ok(Value::Object(row)) => {
                self.insert_row(collection, row);
                Ok(())
            }
            Ok(other) => Err(Error::InvalidInput(format!(
                "record must serialize to an object, got {other}"
            ))),
            Err(e) => Err(Error::InvalidInput(format!("unserializable record: {e}"))),
        }
    }

    pub fn insert_row(&self, collection: &str, row: Row) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .push(row);
    }

    /// Number of rows in `collection` (0 if it does not exist).
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map_or(0, Vec::len)
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

fn row_path(row: &Row) -> Option<&str> {
    row.get("path").and_then(Value::as_str)
}

fn matches(filter: &Filter, row: &Row) -> bool {
    match filter {
        Filter::IdIn(ids) => row_id(row).is_some_and(|id| ids.contains(&EntityId::new(id))),
        Filter::PathIn(paths) => row_path(row).is_some_and(|p| paths.iter().any(|q| q == p)),
        Filter::PathEq(path) => row_path(row) == Some(path.as_str()),
    }
}

fn project(row: &Row, fields: &[&str]) -> Row {
    row.iter()
        .filter(|(key, _)| key.as_str() == "id" || fields.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn vector_field(row: &Row, field: &str) -> Option<Vec<f32>> {
    row.get(field)?
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn missing_collection(name: &str) -> Error {
    Error::Unavailable(format!("collection {name} does not exist"))
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn connect(&self, collection: &str) -> Result<()> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        if collections.contains_key(collection) {
            Ok(())
        } else {
            Err(missing_collection(collection))
        }
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        let rows = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        Ok(rows
            .iter()
            .filter(|row| matches(filter, row))
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| project(row, output_fields))
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        request: &SearchRequest<'_>,
    ) -> Result<Vec<RawHit>> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        let rows = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(id), Some(stored)) = (row_id(row), vector_field(row, request.anns_field))
            else {
                continue;
            };
            if stored.len() != vector.len() {
                return Err(Error::InvalidInput(format!(
                    "query vector has {} dimensions, collection {collection} has {}",
                    vector.len(),
                    stored.len()
                )));
            }
            scored.push((id, squared_l2(vector, &stored), row));
        }

        // Stable: equal distances stay in insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(id, distance, row)| {
                let mut fields = project(row, request.output_fields);
                fields.remove("id");
                RawHit {
                    id: EntityId::new(id),
                    distance,
                    fields,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLLECTION: &str = "embeddings";

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        for (id, path, artist, v) in [
            (1, "a.mp3", "A", [0.0, 0.0]),
            (2, "b.mp3", "B", [1.0, 0.0]),
            (3, "c.mp3", "C", [0.0, 2.0]),
            (4, "d.mp3", "D", [1.0, 0.0]),
        ] {
            backend
                .insert(
                    COLLECTION,
                    &json!({"id": id, "path": path, "artist": artist, "embedding": v}),
                )
                .unwrap();
        }
        backend
    }

    fn request(limit: usize, offset: usize) -> SearchRequest<'static> {
        SearchRequest {
            anns_field: "embedding",
            limit,
            offset,
            nprobe: 16,
            output_fields: &["artist", "path"],
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_distance_with_stable_ties() {
        let hits = backend()
            .search(COLLECTION, &[0.0, 0.0], &request(10, 0))
            .await
            .unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
        assert!(hits[0].distance.abs() < f32::EPSILON);
        assert!((hits[3].distance - 4.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_search_offset_skips_self_match() {
        let hits = backend()
            .search(COLLECTION, &[0.0, 0.0], &request(2, 1))
            .await
            .unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.id.get()).collect();
        assert_eq!(ids, vec![2, 4]);
        assert!(!hits[0].fields.contains_key("embedding"));
        assert!(!hits[0].fields.contains_key("id"));
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_dimension() {
        let err = backend()
            .search(COLLECTION, &[0.0, 0.0, 0.0], &request(2, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let backend = backend();
        let rows = backend
            .query(COLLECTION, &Filter::IdIn(vec![EntityId::new(3)]), &["path"], None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["path"], "c.mp3");
        assert!(!rows[0].contains_key("artist"));

        let rows = backend
            .query(
                COLLECTION,
                &Filter::PathIn(vec!["d.mp3".into(), "a.mp3".into(), "zzz.mp3".into()]),
                &["artist"],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = backend
            .query(COLLECTION, &Filter::PathEq("b.mp3".into()), &[], Some(1))
            .await
            .unwrap();
        assert_eq!(row_id(&rows[0]), Some(2));
    }

    #[tokio::test]
    async fn test_missing_collection_is_unavailable() {
        let backend = MemoryBackend::new();
        assert!(backend.connect("nope").await.unwrap_err().is_retryable());
        backend.create_collection("nope");
        assert!(backend.connect("nope").await.is_ok());
        assert_eq!(backend.len("nope"), 0);
    }
}
