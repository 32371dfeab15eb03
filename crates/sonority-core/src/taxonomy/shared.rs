//! Process-wide taxonomy handle with atomic replacement.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use super::genre::GenreTaxonomy;
use crate::error::Result;

/// Shares one [`GenreTaxonomy`] across concurrent requests.
///
/// Readers take an `Arc` snapshot and keep using it for the rest of their
/// request; a reload swaps the pointer and never mutates a taxonomy that is
/// already handed out.
#[derive(Debug)]
pub struct SharedTaxonomy {
    current: RwLock<Arc<GenreTaxonomy>>,
}

impl SharedTaxonomy {
    #[must_use]
    pub fn new(taxonomy: GenreTaxonomy) -> Self {
        Self {
            current: RwLock::new(Arc::new(taxonomy)),
        }
    }

    /// # Errors
    ///
    /// Propagates [`GenreTaxonomy::load`] failures.
    pub fn load(path: &Path) -> Result<Self> {
        GenreTaxonomy::load(path).map(Self::new)
    }

    /// Snapshot of the taxonomy in effect right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GenreTaxonomy> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install a new taxonomy, returning the one it replaced.
    pub fn replace(&self, taxonomy: GenreTaxonomy) -> Arc<GenreTaxonomy> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(taxonomy))
    }

    /// Load `path` and swap it in. On failure the current taxonomy stays.
    ///
    /// # Errors
    ///
    /// Propagates [`GenreTaxonomy::load`] failures.
    pub fn reload(&self, path: &Path) -> Result<Arc<GenreTaxonomy>> {
        let taxonomy = GenreTaxonomy::load(path)?;
        log::info!(
            "Reloaded genre taxonomy ({} classes) from {}",
            taxonomy.len(),
            path.display()
        );
        Ok(self.replace(taxonomy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy(names: &[&str]) -> GenreTaxonomy {
        GenreTaxonomy::from_classes(names.iter().map(ToString::to_string).collect()).unwrap()
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let shared = SharedTaxonomy::new(taxonomy(&["rock", "pop"]));
        let before = shared.snapshot();
        let old = shared.replace(taxonomy(&["jazz"]));

        assert_eq!(before.classes(), old.classes());
        assert_eq!(before.len(), 2);
        assert_eq!(shared.snapshot().name(0), Some("jazz"));
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let shared = SharedTaxonomy::new(taxonomy(&["rock", "pop"]));
        let result = shared.reload(Path::new("/nonexistent/taxonomy.json"));
        assert!(result.is_err());
        assert_eq!(shared.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_readers() {
        let shared = Arc::new(SharedTaxonomy::new(taxonomy(&["rock", "pop"])));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.snapshot().len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }
}
