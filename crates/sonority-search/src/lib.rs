//! Similarity search for sonority.
//!
//! Connects to the vector index holding the track embeddings and genre
//! activations, runs nearest-neighbor lookups, re-ranks them for artist
//! diversity, and condenses genre activations into top-K summaries.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod genre;
pub mod keepalive;
pub mod rerank;
pub mod resilience;
pub mod store;

pub use config::Config;
pub use engine::{SearchSettings, SimilarityEngine};
pub use genre::{GenreSummarizer, GenreSummary};
pub use keepalive::KeepAlive;
pub use resilience::RetryPolicy;
pub use store::{EmbeddingStore, MemoryBackend, MilvusBackend, VectorBackend};
