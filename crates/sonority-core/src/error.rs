use thiserror::Error;

/// Errors surfaced by the similarity and genre layers.
///
/// Driver-level failures (HTTP, JSON, SQLite) are translated into one of
/// these variants at the adapter boundary and never escape as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// An id or path lookup matched nothing. Never retried.
    #[error("not found: {entity} with key {key}")]
    NotFound { entity: &'static str, key: String },

    /// The vector index or catalog is unreachable, unauthenticated, or
    /// timed out. Safe to retry with backoff.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Activation or taxonomy data is missing or malformed.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// The caller supplied an argument the index cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse classification of an [`Error`], for client-facing mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    DataUnavailable,
    InvalidInput,
}

impl ErrorKind {
    /// Stable category string for responses and exit messages.
    #[must_use]
    pub const fn category(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::DataUnavailable => "data_unavailable",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] keyed by anything displayable.
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::DataUnavailable(_) => ErrorKind::DataUnavailable,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Returns `true` when the operation may succeed if retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns `true` when the error indicates the entity was not found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(format!("catalog database error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(Error::Unavailable("timeout".into()).is_retryable());
        assert!(!Error::not_found("embedding", 7).is_retryable());
        assert!(!Error::DataUnavailable("no predictions".into()).is_retryable());
        assert!(!Error::InvalidInput("dim".into()).is_retryable());
    }

    #[test]
    fn test_kind_categories_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Unavailable,
            ErrorKind::DataUnavailable,
            ErrorKind::InvalidInput,
        ];
        let categories: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.category()).collect();
        assert_eq!(categories.len(), kinds.len());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("embedding", "music/a.mp3");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "not found: embedding with key music/a.mp3"
        );
    }

    #[test]
    fn test_sqlite_error_maps_to_unavailable() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
