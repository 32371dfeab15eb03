//! Embedding Store Adapter.
//!
//! [`EmbeddingStore`] owns the connection to the vector index and hands out
//! typed handles for its two collections. Index rows cross the
//! [`VectorBackend`] seam as JSON maps and are converted to
//! [`EmbeddingRecord`]/[`ActivationRecord`] here, so nothing past this
//! module sees backend-native shapes.

pub mod memory;
pub mod milvus;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use sonority_core::dto::PingReport;
use sonority_core::model::{ActivationRecord, EmbeddingRecord, EntityId, Hit};
use sonority_core::{Error, Result};

use crate::config::Config;
use crate::resilience::RetryPolicy;

pub use memory::MemoryBackend;
pub use milvus::MilvusBackend;

/// A row as returned by the index: field name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Name of the vector field in the full-vector collection.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Fields of a full hit.
pub const FULL_FIELDS: &[&str] = &["path", "title", "album", "artist", "top_5_genres", "embedding"];

/// Fields of a short hit.
pub const SHORT_FIELDS: &[&str] = &["title", "album", "artist", "path"];

const ACTIVATION_FIELDS: &[&str] = &["predictions", "title", "artist", "path"];

/// Scalar filter over a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    IdIn(Vec<EntityId>),
    PathIn(Vec<String>),
    PathEq(String),
}

/// Parameters of one nearest-neighbor request.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub anns_field: &'a str,
    pub limit: usize,
    pub offset: usize,
    pub nprobe: u32,
    pub output_fields: &'a [&'a str],
}

/// One backend search result before conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: EntityId,
    pub distance: f32,
    pub fields: Row,
}

/// Access to an approximate nearest-neighbor index service.
///
/// Implementations translate every driver failure into
/// [`Error::Unavailable`] (or [`Error::InvalidInput`] for requests the
/// index rejects as malformed).
#[async_trait]
pub trait VectorBackend: Send + Sync + Debug {
    /// Verify the service is reachable and `collection` exists. Must be
    /// idempotent.
    async fn connect(&self, collection: &str) -> Result<()>;

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<Row>>;

    /// Hits for a single seed vector, nearest first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        request: &SearchRequest<'_>,
    ) -> Result<Vec<RawHit>>;
}

/// Connected handle to the vector index.
///
/// Cheap to clone; clones share the backend. Construct one per process and
/// pass it to whoever needs it.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    backend: Arc<dyn VectorBackend>,
    full_collection: Arc<str>,
    activation_collection: Arc<str>,
    retry: RetryPolicy,
}

impl EmbeddingStore {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        full_collection: &str,
        activation_collection: &str,
    ) -> Self {
        Self {
            backend,
            full_collection: Arc::from(full_collection),
            activation_collection: Arc::from(activation_collection),
            retry: RetryPolicy::default(),
        }
    }

    /// Build a store backed by Milvus as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = MilvusBackend::new(
            &config.milvus_uri,
            config.milvus_api_key.clone(),
            config.request_timeout(),
            config.connect_timeout(),
        )?;
        Ok(Self::new(
            Arc::new(backend),
            &config.full_collection,
            &config.activation_collection,
        )
        .with_retry(RetryPolicy::from_config(config)))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Handle to the full embedding-vector collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the index cannot be reached or the
    /// collection does not exist.
    pub async fn full_vectors(&self) -> Result<FullVectorCollection<'_>> {
        self.connect(&self.full_collection).await?;
        Ok(FullVectorCollection {
            store: self,
            name: &self.full_collection,
        })
    }

    /// Handle to the genre-activation collection.
    ///
    /// # Errors
    ///
    /// Same as [`Self::full_vectors`].
    pub async fn genre_activations(&self) -> Result<ActivationCollection<'_>> {
        self.connect(&self.activation_collection).await?;
        Ok(ActivationCollection {
            store: self,
            name: &self.activation_collection,
        })
    }

    /// Look up the sentinel record to check the index is alive.
    ///
    /// Never fails; problems are reported in the returned [`PingReport`].
    /// Running this periodically also keeps a serverless index from
    /// suspending itself for inactivity.
    pub async fn ping(&self) -> PingReport {
        let backend = self.backend.as_ref();
        let name: &str = &self.full_collection;
        let filter = Filter::IdIn(vec![EntityId::SENTINEL]);
        let filter = &filter;
        let result = self
            .retry
            .attempt("ping", backend.query(name, filter, &["artist"], Some(1)))
            .await;

        match result {
            Ok(rows) if !rows.is_empty() => PingReport::success("Milvus is running"),
            Ok(_) => PingReport::error(format!(
                "sentinel id {} not found in {name}",
                EntityId::SENTINEL
            )),
            Err(e) => PingReport::error(e.to_string()),
        }
    }

    async fn connect(&self, collection: &str) -> Result<()> {
        let backend = self.backend.as_ref();
        self.retry
            .run("connect", move || backend.connect(collection))
            .await
    }

    async fn query_rows(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[&str],
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let backend = self.backend.as_ref();
        self.retry
            .run("query", move || backend.query(collection, filter, fields, limit))
            .await
    }

    async fn search_rows(
        &self,
        collection: &str,
        vector: &[f32],
        request: &SearchRequest<'_>,
    ) -> Result<Vec<RawHit>> {
        let backend = self.backend.as_ref();
        self.retry
            .run("search", move || backend.search(collection, vector, request))
            .await
    }
}

/// Typed access to the full embedding-vector collection.
#[derive(Debug, Clone, Copy)]
pub struct FullVectorCollection<'a> {
    store: &'a EmbeddingStore,
    name: &'a str,
}

impl FullVectorCollection<'_> {
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Exact lookup by identity.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `id`.
    pub async fn query_by_id(&self, id: EntityId) -> Result<EmbeddingRecord> {
        let rows = self
            .store
            .query_rows(self.name, &Filter::IdIn(vec![id]), FULL_FIELDS, None)
            .await?;
        rows.into_iter()
            .next()
            .map(record_from_row)
            .transpose()?
            .ok_or_else(|| Error::not_found("embedding", id))
    }

    /// Exact lookup by file paths, in the order the paths were given.
    /// Paths with no record are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if none of the paths match, including when
    /// `paths` is empty.
    pub async fn query_by_paths(&self, paths: &[String]) -> Result<Vec<EmbeddingRecord>> {
        if paths.is_empty() {
            return Err(Error::not_found("embedding", "<no paths>"));
        }
        let rows = self
            .store
            .query_rows(self.name, &Filter::PathIn(paths.to_vec()), FULL_FIELDS, None)
            .await?;
        let mut records = rows
            .into_iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;
        if records.is_empty() {
            return Err(Error::not_found("embedding", paths.join(", ")));
        }
        records.sort_by_key(|r| paths.iter().position(|p| *p == r.path));
        records.dedup_by(|a, b| a.path == b.path);
        Ok(records)
    }

    /// Nearest neighbors of each seed, nearest first, in seed order.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn search(
        &self,
        seeds: &[Vec<f32>],
        request: &SearchRequest<'_>,
    ) -> Result<Vec<Vec<Hit>>> {
        log::debug!(
            "Searching {} with {} seed(s): limit={} offset={} nprobe={}",
            self.name,
            seeds.len(),
            request.limit,
            request.offset,
            request.nprobe
        );
        let mut groups = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let raw = self.store.search_rows(self.name, seed, request).await?;
            let hits = raw
                .into_iter()
                .map(hit_from_raw)
                .collect::<Result<Vec<_>>>()?;
            groups.push(hits);
        }
        Ok(groups)
    }
}

/// Typed access to the genre-activation collection.
#[derive(Debug, Clone, Copy)]
pub struct ActivationCollection<'a> {
    store: &'a EmbeddingStore,
    name: &'a str,
}

impl ActivationCollection<'_> {
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// Activation record for one file path.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `path`,
    /// [`Error::DataUnavailable`] if the stored record is malformed.
    pub async fn query_by_path(&self, path: &str) -> Result<ActivationRecord> {
        let rows = self
            .store
            .query_rows(
                self.name,
                &Filter::PathEq(path.to_string()),
                ACTIVATION_FIELDS,
                Some(1),
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("genre activations", path))?;
        let mut record: ActivationRecord = from_row(row)?;
        if record.path.is_empty() {
            record.path = path.to_string();
        }
        Ok(record)
    }
}

/// Index services may send 64-bit ids as strings; normalize to numbers.
fn normalize_id(row: &mut Row) -> Result<()> {
    if let Some(Value::String(raw)) = row.get("id") {
        let id: i64 = raw.parse().map_err(|_| {
            Error::DataUnavailable(format!("index returned non-numeric id {raw:?}"))
        })?;
        row.insert("id".to_string(), Value::from(id));
    }
    Ok(())
}

/// Decode a stored row. A row that does not fit the record type is bad
/// data, not a transport fault, so it is never retried.
fn from_row<T: serde::de::DeserializeOwned>(mut row: Row) -> Result<T> {
    normalize_id(&mut row)?;
    serde_json::from_value(Value::Object(row))
        .map_err(|e| Error::DataUnavailable(format!("malformed record in index: {e}")))
}

fn record_from_row(row: Row) -> Result<EmbeddingRecord> {
    from_row(row)
}

fn hit_from_raw(raw: RawHit) -> Result<Hit> {
    let mut fields = raw.fields;
    fields.insert("id".to_string(), Value::from(raw.id.get()));
    Ok(Hit {
        id: raw.id,
        distance: raw.distance,
        record: from_row(fields)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test rows are objects"),
        }
    }

    #[test]
    fn test_record_from_row_accepts_string_id() {
        let record = record_from_row(row(json!({
            "id": "449540212283170816",
            "path": "a.mp3",
            "title": "A",
            "album": "B",
            "artist": "C",
            "top_5_genres": ["rock"],
            "embedding": [0.5]
        })))
        .unwrap();
        assert_eq!(record.id, EntityId::new(449_540_212_283_170_816));
    }

    #[test]
    fn test_record_from_row_rejects_garbage_id() {
        let err = record_from_row(row(json!({"id": "abc"}))).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_record_from_row_rejects_malformed_embedding() {
        let err = record_from_row(row(json!({
            "id": 3,
            "path": "a.mp3",
            "top_5_genres": "rock",
            "embedding": ["x", 0.5]
        })))
        .unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
        assert!(!err.is_retryable());
    }

    fn memory_store() -> (Arc<MemoryBackend>, EmbeddingStore) {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_collection("embeddings");
        backend.create_collection("activations");
        let store = EmbeddingStore::new(Arc::<MemoryBackend>::clone(&backend), "embeddings", "activations")
            .with_retry(RetryPolicy {
                timeout: std::time::Duration::from_secs(1),
                max_times: 3,
                min_delay: std::time::Duration::from_millis(1),
            });
        (backend, store)
    }

    #[tokio::test]
    async fn test_malformed_activations_are_data_unavailable() {
        let (backend, store) = memory_store();
        backend
            .insert(
                "activations",
                &json!({
                    "id": 1,
                    "path": "x.mp3",
                    "predictions": [["oops", 0.2], [0.1, 0.2]]
                }),
            )
            .unwrap();

        let err = store
            .genre_activations()
            .await
            .unwrap()
            .query_by_path("x.mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.kind().category(), "data_unavailable");
    }

    #[tokio::test]
    async fn test_empty_path_list_is_not_found() {
        let (_backend, store) = memory_store();
        let err = store
            .full_vectors()
            .await
            .unwrap()
            .query_by_paths(&[])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_hit_from_raw_injects_id() {
        let hit = hit_from_raw(RawHit {
            id: EntityId::new(9),
            distance: 1.25,
            fields: row(json!({"title": "T", "album": "A", "artist": "R", "path": "p"})),
        })
        .unwrap();
        assert_eq!(hit.record.id, EntityId::new(9));
        assert_eq!(hit.record.title, "T");
        assert!(hit.record.embedding.is_empty());
    }
}
