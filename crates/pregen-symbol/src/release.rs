//! Release identifiers
//!
//! A [`ReleaseId`] names one published build of the target application
//! (`1.14.4`, `20w22a`, ...). Identifiers carry no ordering of their own;
//! compare them through a [`ReleaseCatalog`](crate::ReleaseCatalog).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque release identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Create new release identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReleaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReleaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ReleaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_id_display_is_verbatim() {
        assert_eq!(ReleaseId::new("20w22a").to_string(), "20w22a");
    }

    #[test]
    fn release_id_serde_transparent() {
        let id: ReleaseId = serde_json::from_str("\"1.14.4\"").unwrap();
        assert_eq!(id, ReleaseId::from("1.14.4"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1.14.4\"");
    }
}
