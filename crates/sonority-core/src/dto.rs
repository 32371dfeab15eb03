//! Public response shapes and the pure mappings that produce them.
//!
//! The full entity is display-oriented: genre tags are joined with `,`
//! and the embedding is rendered as a comma-separated string. Consumers
//! that need the list forms use [`split_genres`] and [`parse_embedding`].

use serde::{Deserialize, Serialize};

use crate::model::{EmbeddingRecord, EntityId, Hit};

const SEPARATOR: char = ',';

/// Embedding of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub id: String,
    pub embedding: Vec<f32>,
}

/// All stored fields of a record, flattened to display strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullEntity {
    pub path: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub top_5_genres: String,
    pub embedding: String,
}

/// A search hit for detail views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarHit {
    pub id: String,
    pub title: String,
    pub distance: f32,
    pub entity: FullEntity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarFullEntitiesResponse {
    pub hits: Vec<SimilarHit>,
}

/// Display fields only; also the working unit of the diversity re-ranker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimilarShortEntity {
    pub title: String,
    pub album: String,
    pub artist: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarShortEntitiesResponse {
    pub entities: Vec<SimilarShortEntity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Success,
    Error,
}

/// Outcome of a liveness probe. Probes report failures here instead of
/// returning an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReport {
    pub status: PingStatus,
    pub message: String,
}

impl PingReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: PingStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: PingStatus::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PingStatus::Success
    }
}

#[must_use]
pub fn to_full_entity(record: &EmbeddingRecord) -> FullEntity {
    FullEntity {
        path: record.path.clone(),
        title: record.title.clone(),
        album: record.album.clone(),
        artist: record.artist.clone(),
        top_5_genres: join_genres(&record.top_5_genres),
        embedding: join_embedding(&record.embedding),
    }
}

#[must_use]
pub fn to_short_entity(record: &EmbeddingRecord) -> SimilarShortEntity {
    SimilarShortEntity {
        title: record.title.clone(),
        album: record.album.clone(),
        artist: record.artist.clone(),
        path: record.path.clone(),
    }
}

#[must_use]
pub fn to_embedding_response(id: EntityId, vector: &[f32]) -> EmbeddingResponse {
    EmbeddingResponse {
        id: id.to_string(),
        embedding: vector.to_vec(),
    }
}

#[must_use]
pub fn to_similar_hit(hit: &Hit) -> SimilarHit {
    SimilarHit {
        id: hit.id.to_string(),
        title: hit.record.title.clone(),
        distance: hit.distance,
        entity: to_full_entity(&hit.record),
    }
}

#[must_use]
pub fn join_genres(genres: &[String]) -> String {
    genres.join(",")
}

/// Inverse of [`join_genres`]. An empty string yields an empty list.
#[must_use]
pub fn split_genres(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(SEPARATOR).map(str::to_string).collect()
}

fn join_embedding(embedding: &[f32]) -> String {
    embedding
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of the embedding display string in [`FullEntity`].
///
/// # Errors
///
/// Returns the parse error of the first component that is not a float.
pub fn parse_embedding(joined: &str) -> Result<Vec<f32>, std::num::ParseFloatError> {
    if joined.is_empty() {
        return Ok(Vec::new());
    }
    joined.split(SEPARATOR).map(str::parse).collect()
}
