//! Core domain model for sonority.
//!
//! This crate defines the embedding and genre-activation records read from
//! the vector index, the error taxonomy shared by every layer, the genre
//! class taxonomy, the public response shapes, and the read-only catalog
//! lookup.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod catalog;
pub mod dto;
pub mod error;
pub mod model;
pub mod taxonomy;

pub use error::{Error, ErrorKind, Result};
