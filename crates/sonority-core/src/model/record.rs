use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use crate::error::{Error, Result};

/// Placeholder for display metadata the extraction pipeline left blank.
pub const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// A track in the full-vector collection.
///
/// `path` is unique within the collection and `embedding` has the
/// collection's fixed dimensionality. Records are written by the offline
/// feature-extraction pipeline and only ever read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: EntityId,

    /// Object-store key of the underlying audio file.
    #[serde(default)]
    pub path: String,

    #[serde(default = "unknown")]
    pub title: String,

    #[serde(default = "unknown")]
    pub album: String,

    #[serde(default = "unknown")]
    pub artist: String,

    /// Descriptive genre tags, most confident first.
    #[serde(default)]
    pub top_5_genres: Vec<String>,

    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// Per-class model output, either one row per scored window or a single
/// flat row when only one window was scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivationTensor {
    Windows(Vec<Vec<f32>>),
    Single(Vec<f32>),
}

impl ActivationTensor {
    /// View the tensor as rank-2, promoting a flat vector to one row.
    #[must_use]
    pub fn rows(&self) -> Vec<&[f32]> {
        match self {
            Self::Windows(rows) => rows.iter().map(Vec::as_slice).collect(),
            Self::Single(row) => vec![row.as_slice()],
        }
    }

    /// Width of every row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUnavailable`] when the tensor has no rows, an
    /// empty row, or rows of differing width.
    pub fn num_classes(&self) -> Result<usize> {
        let rows = self.rows();
        let width = rows
            .first()
            .map(|r| r.len())
            .ok_or_else(|| Error::DataUnavailable("activation tensor has no rows".into()))?;
        if width == 0 {
            return Err(Error::DataUnavailable("activation tensor has empty rows".into()));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(Error::DataUnavailable(format!(
                "activation row {bad} has {} classes, expected {width}",
                rows[bad].len()
            )));
        }
        Ok(width)
    }
}

/// A track in the genre-activation collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    #[serde(default)]
    pub id: Option<EntityId>,

    #[serde(default)]
    pub path: String,

    #[serde(default = "unknown")]
    pub title: String,

    #[serde(default = "unknown")]
    pub artist: String,

    #[serde(default)]
    pub predictions: Option<ActivationTensor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedding_record_defaults_missing_metadata() {
        let record: EmbeddingRecord = serde_json::from_value(json!({
            "id": 3,
            "path": "a/b.mp3",
            "embedding": [0.5, 1.5]
        }))
        .unwrap();
        assert_eq!(record.title, UNKNOWN);
        assert_eq!(record.album, UNKNOWN);
        assert_eq!(record.artist, UNKNOWN);
        assert!(record.top_5_genres.is_empty());
        assert_eq!(record.embedding, vec![0.5, 1.5]);
    }

    #[test]
    fn test_activation_tensor_accepts_both_ranks() {
        let flat: ActivationTensor = serde_json::from_value(json!([0.1, 0.2])).unwrap();
        let nested: ActivationTensor = serde_json::from_value(json!([[0.1, 0.2]])).unwrap();
        assert!(matches!(flat, ActivationTensor::Single(_)));
        assert!(matches!(nested, ActivationTensor::Windows(_)));
        assert_eq!(flat.rows(), nested.rows());
    }

    #[test]
    fn test_num_classes_rejects_ragged_rows() {
        let tensor = ActivationTensor::Windows(vec![vec![0.1, 0.2], vec![0.3]]);
        let err = tensor.num_classes().unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[test]
    fn test_num_classes_rejects_empty() {
        assert!(ActivationTensor::Windows(vec![]).num_classes().is_err());
        assert!(ActivationTensor::Single(vec![]).num_classes().is_err());
    }

    #[test]
    fn test_activation_record_without_predictions() {
        let record: ActivationRecord =
            serde_json::from_value(json!({"title": "Song", "artist": "Band"})).unwrap();
        assert!(record.predictions.is_none());
        assert!(record.id.is_none());
    }
}
