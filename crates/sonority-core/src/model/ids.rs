use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a record in the vector index.
///
/// The index assigns 64-bit integer keys; once assigned they are stable.
/// Responses carry the id in its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Sentinel id probed by liveness checks.
    pub const SENTINEL: Self = Self(0);

    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<i64> for EntityId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display_and_parse() {
        let id = EntityId::new(449_123);
        assert_eq!(id.to_string(), "449123");
        assert_eq!(" 449123 ".parse::<EntityId>().unwrap(), id);
    }

    #[test]
    fn test_entity_id_rejects_non_numeric() {
        assert!("abc".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_entity_id_serializes_transparently() {
        let json = serde_json::to_string(&EntityId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
