pub mod hit;
pub mod ids;
pub mod record;

pub use hit::Hit;
pub use ids::EntityId;
pub use record::{ActivationRecord, ActivationTensor, EmbeddingRecord, UNKNOWN};
