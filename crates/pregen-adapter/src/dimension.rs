//! World dimensions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the target's three built-in dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dimension {
    /// Default world
    Overworld,
    /// Nether
    Nether,
    /// End
    End,
}

impl Dimension {
    /// All dimensions in declaration order
    pub const ALL: [Self; 3] = [Self::Overworld, Self::Nether, Self::End];

    /// Canonical upper-case name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overworld => "OVERWORLD",
            Self::Nether => "NETHER",
            Self::End => "END",
        }
    }

    /// Index into [`Dimension::ALL`]
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized dimension name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dimension {0:?}, expected one of OVERWORLD, NETHER, END")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDimension(s.to_string()))
    }
}

impl TryFrom<String> for Dimension {
    type Error = UnknownDimension;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("nether".parse::<Dimension>().unwrap(), Dimension::Nether);
        assert_eq!("End".parse::<Dimension>().unwrap(), Dimension::End);
        assert!("the_end".parse::<Dimension>().is_err());
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&Dimension::Overworld).unwrap();
        assert_eq!(json, "\"OVERWORLD\"");
        let back: Dimension = serde_json::from_str("\"overworld\"").unwrap();
        assert_eq!(back, Dimension::Overworld);
    }

    #[test]
    fn index_matches_all() {
        for (i, d) in Dimension::ALL.into_iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }
}
