//! Similarity Search Engine.
//!
//! Turns seed records (by id, by path, or a raw vector) into ranked
//! neighbor lists and shapes them into the response DTOs.
//!
//! Offsets follow one rule: a seed that is itself a stored record finds
//! itself first at distance ~0, so searches seeded from the store skip one
//! hit; searches seeded from an external vector skip none.

use sonority_core::catalog::CatalogLookup;
use sonority_core::dto::{
    to_embedding_response, to_short_entity, to_similar_hit, EmbeddingResponse,
    SimilarFullEntitiesResponse, SimilarShortEntitiesResponse, SimilarShortEntity,
};
use sonority_core::model::{EmbeddingRecord, EntityId, Hit};
use sonority_core::{Error, Result};

use crate::config::Config;
use crate::rerank;
use crate::store::{EmbeddingStore, SearchRequest, EMBEDDING_FIELD, FULL_FIELDS, SHORT_FIELDS};

/// Offset for seeds read from the store: drops the self-match.
const STORED_SEED_SKIP: usize = 1;
/// Offset for external vectors.
const SYNTHETIC_SEED_SKIP: usize = 0;

/// Tunables for the similarity lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    /// IVF clusters probed per search.
    pub nprobe: u32,
    /// Hits returned by the full-entity lookups.
    pub full_result_count: usize,
    /// Candidates fetched before diversity re-ranking.
    pub candidate_pool: usize,
    /// Entities returned by the diverse short lookup.
    pub rerank_target: usize,
    /// Expected length of every embedding vector.
    pub embedding_dim: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            nprobe: 16,
            full_result_count: 3,
            candidate_pool: 27,
            rerank_target: rerank::DEFAULT_TARGET,
            embedding_dim: 512,
        }
    }
}

impl SearchSettings {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            nprobe: config.nprobe,
            full_result_count: config.full_result_count,
            candidate_pool: config.candidate_pool,
            rerank_target: config.rerank_target,
            embedding_dim: config.embedding_dim,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `nprobe` or `full_result_count`
    /// is zero, or the candidate pool leaves the re-ranker no headroom.
    pub fn validate(&self) -> Result<()> {
        if self.nprobe == 0 {
            return Err(Error::InvalidInput("nprobe must be at least 1".into()));
        }
        if self.full_result_count == 0 {
            return Err(Error::InvalidInput(
                "full_result_count must be at least 1".into(),
            ));
        }
        if self.candidate_pool <= self.rerank_target {
            return Err(Error::InvalidInput(format!(
                "candidate_pool ({}) must be larger than rerank_target ({})",
                self.candidate_pool, self.rerank_target
            )));
        }
        Ok(())
    }
}

/// Nearest-neighbor lookups over the full-vector collection.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    store: EmbeddingStore,
    settings: SearchSettings,
}

impl SimilarityEngine {
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `settings` do not validate.
    pub fn new(store: EmbeddingStore, settings: SearchSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { store, settings })
    }

    #[must_use]
    pub const fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    #[must_use]
    pub const fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `id`.
    pub async fn query_by_id(&self, id: EntityId) -> Result<EmbeddingRecord> {
        self.store.full_vectors().await?.query_by_id(id).await
    }

    /// Records for `paths`, in path order. Unmatched paths are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if none of the paths match (an empty list
    /// matches nothing).
    pub async fn query_by_paths(&self, paths: &[String]) -> Result<Vec<EmbeddingRecord>> {
        self.store.full_vectors().await?.query_by_paths(paths).await
    }

    /// Full hits for each seed, nearest first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `result_count` is zero; otherwise
    /// propagates index failures.
    pub async fn search(
        &self,
        seeds: &[Vec<f32>],
        result_count: usize,
        skip: usize,
    ) -> Result<Vec<Vec<Hit>>> {
        let request = self.request(result_count, skip, FULL_FIELDS)?;
        self.store.full_vectors().await?.search(seeds, &request).await
    }

    /// Short hits for each seed, nearest first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `result_count` is zero; otherwise
    /// propagates index failures.
    pub async fn search_short(
        &self,
        seeds: &[Vec<f32>],
        result_count: usize,
        skip: usize,
    ) -> Result<Vec<Vec<SimilarShortEntity>>> {
        let request = self.request(result_count, skip, SHORT_FIELDS)?;
        let groups = self.store.full_vectors().await?.search(seeds, &request).await?;
        Ok(groups
            .iter()
            .map(|hits| hits.iter().map(|h| to_short_entity(&h.record)).collect())
            .collect())
    }

    /// Stored embedding of `id`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `id`.
    pub async fn embedding_by_id(&self, id: EntityId) -> Result<EmbeddingResponse> {
        let record = self.query_by_id(id).await?;
        Ok(to_embedding_response(record.id, &record.embedding))
    }

    /// Nearest neighbors of the record `id`, excluding itself.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `id`.
    pub async fn similar_full_by_id(&self, id: EntityId) -> Result<SimilarFullEntitiesResponse> {
        let record = self.query_by_id(id).await?;
        let seed = seed_vector(&record)?;
        self.full_response(seed, self.settings.full_result_count, STORED_SEED_SKIP)
            .await
    }

    /// Nearest neighbors of the first matched path, excluding itself.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if none of the paths match.
    pub async fn similar_full_by_paths(
        &self,
        paths: &[String],
    ) -> Result<SimilarFullEntitiesResponse> {
        let records = self.query_by_paths(paths).await?;
        let seed = first_seed(&records)?;
        self.full_response(seed, self.settings.full_result_count, STORED_SEED_SKIP)
            .await
    }

    /// Artist-diverse neighbors of the first matched path.
    ///
    /// Fetches `candidate_pool` hits and re-ranks them down to
    /// `rerank_target`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if none of the paths match.
    pub async fn similar_short_by_paths(
        &self,
        paths: &[String],
    ) -> Result<SimilarShortEntitiesResponse> {
        let records = self.query_by_paths(paths).await?;
        let seed = first_seed(&records)?;
        let candidates = self
            .search_short(
                std::slice::from_ref(seed),
                self.settings.candidate_pool,
                STORED_SEED_SKIP,
            )
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        log::debug!(
            "Re-ranking {} candidates down to {}",
            candidates.len(),
            self.settings.rerank_target
        );
        Ok(SimilarShortEntitiesResponse {
            entities: rerank::diversify(candidates, self.settings.rerank_target),
        })
    }

    /// Nearest neighbors of an external vector. Nothing is skipped.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `vector` has the wrong dimensionality or
    /// `count` is zero.
    pub async fn similar_by_vector(
        &self,
        vector: &[f32],
        count: usize,
    ) -> Result<SimilarFullEntitiesResponse> {
        if vector.len() != self.settings.embedding_dim {
            return Err(Error::InvalidInput(format!(
                "expected a {}-dimensional vector, got {}",
                self.settings.embedding_dim,
                vector.len()
            )));
        }
        self.full_response(vector, count, SYNTHETIC_SEED_SKIP).await
    }

    /// Resolve `path` through the catalog, then search by its id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the catalog or the index has no such entity.
    pub async fn similar_full_by_catalog_path(
        &self,
        catalog: &dyn CatalogLookup,
        path: &str,
    ) -> Result<SimilarFullEntitiesResponse> {
        let id = catalog.id_for_path(path)?;
        log::debug!("Catalog resolved {path} to id {id}");
        self.similar_full_by_id(id).await
    }

    async fn full_response(
        &self,
        seed: &[f32],
        count: usize,
        skip: usize,
    ) -> Result<SimilarFullEntitiesResponse> {
        let hits = self
            .search(&[seed.to_vec()], count, skip)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(SimilarFullEntitiesResponse {
            hits: hits.iter().map(to_similar_hit).collect(),
        })
    }

    fn request<'a>(
        &self,
        limit: usize,
        offset: usize,
        fields: &'a [&'a str],
    ) -> Result<SearchRequest<'a>> {
        if limit == 0 {
            return Err(Error::InvalidInput(
                "result count must be at least 1".into(),
            ));
        }
        Ok(SearchRequest {
            anns_field: EMBEDDING_FIELD,
            limit,
            offset,
            nprobe: self.settings.nprobe,
            output_fields: fields,
        })
    }
}

fn seed_vector(record: &EmbeddingRecord) -> Result<&Vec<f32>> {
    if record.embedding.is_empty() {
        return Err(Error::DataUnavailable(format!(
            "record {} has no stored embedding",
            record.id
        )));
    }
    Ok(&record.embedding)
}

fn first_seed(records: &[EmbeddingRecord]) -> Result<&Vec<f32>> {
    let first = records
        .first()
        .ok_or_else(|| Error::InvalidInput("no seed records".into()))?;
    seed_vector(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    const FULL: &str = "embeddings";

    fn engine(rows: &[(i64, &str, &str, [f32; 2])]) -> SimilarityEngine {
        let backend = MemoryBackend::new();
        backend.create_collection("activations");
        for (id, path, artist, v) in rows {
            backend
                .insert(
                    FULL,
                    &json!({
                        "id": id, "path": path, "title": path, "album": "Album",
                        "artist": artist, "top_5_genres": ["rock", "pop"], "embedding": v
                    }),
                )
                .unwrap();
        }
        let store = EmbeddingStore::new(Arc::new(backend), FULL, "activations");
        let settings = SearchSettings {
            embedding_dim: 2,
            full_result_count: 2,
            candidate_pool: 5,
            rerank_target: 3,
            ..SearchSettings::default()
        };
        SimilarityEngine::new(store, settings).unwrap()
    }

    fn sample() -> SimilarityEngine {
        engine(&[
            (1, "a.mp3", "A", [0.0, 0.0]),
            (2, "b.mp3", "A", [0.1, 0.0]),
            (3, "c.mp3", "B", [0.2, 0.0]),
            (4, "d.mp3", "A", [0.3, 0.0]),
            (5, "e.mp3", "C", [0.4, 0.0]),
            (6, "f.mp3", "D", [5.0, 5.0]),
        ])
    }

    #[test]
    fn test_settings_validation() {
        assert!(SearchSettings::default().validate().is_ok());
        let no_headroom = SearchSettings {
            candidate_pool: 9,
            ..SearchSettings::default()
        };
        assert!(matches!(
            no_headroom.validate(),
            Err(Error::InvalidInput(_))
        ));
        let no_probe = SearchSettings {
            nprobe: 0,
            ..SearchSettings::default()
        };
        assert!(no_probe.validate().is_err());
        let no_results = SearchSettings {
            full_result_count: 0,
            ..SearchSettings::default()
        };
        assert!(no_results.validate().is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = SearchSettings::from_config(&Config::default());
        assert_eq!(settings, SearchSettings::default());
    }

    #[tokio::test]
    async fn test_similar_by_id_excludes_self() {
        let response = sample().similar_full_by_id(EntityId::new(1)).await.unwrap();
        let ids: Vec<&str> = response.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(response.hits[0].entity.top_5_genres, "rock,pop");
    }

    #[tokio::test]
    async fn test_similar_by_vector_keeps_exact_match() {
        let response = sample().similar_by_vector(&[0.0, 0.0], 2).await.unwrap();
        assert_eq!(response.hits[0].id, "1");
        assert!(response.hits[0].distance.abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_similar_by_vector_checks_dimension() {
        let err = sample().similar_by_vector(&[0.0; 3], 2).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_short_lookup_prefers_distinct_artists() {
        let response = sample()
            .similar_short_by_paths(&["a.mp3".to_string()])
            .await
            .unwrap();
        let artists: Vec<&str> = response.entities.iter().map(|e| e.artist.as_str()).collect();
        // Candidates after self: b(A) c(B) d(A) e(C) f(D); A is seen once.
        assert_eq!(artists, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_zero_result_count_is_rejected() {
        let engine = sample();
        let err = engine.similar_by_vector(&[0.0, 0.0], 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = engine
            .search_short(&[vec![0.0, 0.0]], 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let err = sample().similar_full_by_id(EntityId::new(99)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_embedding_by_id() {
        let response = sample().embedding_by_id(EntityId::new(3)).await.unwrap();
        assert_eq!(response.id, "3");
        assert_eq!(response.embedding, vec![0.2, 0.0]);
    }
}
