//! The genre class taxonomy.
//!
//! An ordered list of class names supplied by the model that produced the
//! activation tensors: position `i` names column `i` of every tensor. The
//! file is the model's JSON metadata; only its `classes` array is read.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use sonority_core::taxonomy::GenreTaxonomy;
//!
//! let taxonomy = GenreTaxonomy::load(Path::new("mtg_jamendo_genre.json")).unwrap();
//! assert!(!taxonomy.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreTaxonomy {
    classes: Vec<String>,
}

impl GenreTaxonomy {
    /// Build a taxonomy from class names in column order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUnavailable`] if `classes` is empty.
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            return Err(Error::DataUnavailable("genre taxonomy has no classes".into()));
        }
        Ok(Self { classes })
    }

    /// Load the taxonomy from a model metadata JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataUnavailable`] if the file cannot be read, is not
    /// JSON, has no `classes` array, or the array is empty.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::DataUnavailable(format!(
                "failed to read genre taxonomy {}: {e}",
                path.display()
            ))
        })?;
        let taxonomy: Self = serde_json::from_str(&content).map_err(|e| {
            Error::DataUnavailable(format!(
                "failed to parse genre taxonomy from {}: {e}",
                path.display()
            ))
        })?;
        log::debug!(
            "Loaded {} genre classes from {}",
            taxonomy.classes.len(),
            path.display()
        );
        Self::from_classes(taxonomy.classes)
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class name for a tensor column.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}
