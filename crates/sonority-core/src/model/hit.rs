use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use super::record::EmbeddingRecord;

/// One row of a nearest-neighbor result.
///
/// Smaller distance means more similar. Hits only live for a single
/// query/response cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: EntityId,
    pub distance: f32,
    pub record: EmbeddingRecord,
}
