//! Symbolic references
//!
//! A [`Symbol`] is the stable, human-readable name of a type or member as it
//! appears on the left-hand side of a mapping document. Errors everywhere in
//! the workspace name the symbol they failed on.

use std::fmt;

/// Stable symbolic name of a type, field or method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Code unit (class) by its display name
    Type {
        /// Fully qualified display name
        name: String,
    },

    /// Field declared on a code unit
    Field {
        /// Owning type display name
        owner: String,
        /// Field display name
        name: String,
    },

    /// Method declared on a code unit
    Method {
        /// Owning type display name
        owner: String,
        /// Method display name
        name: String,
        /// Ordered parameter type names
        params: Vec<String>,
    },
}

impl Symbol {
    /// Type symbol
    #[inline]
    #[must_use]
    pub fn ty(name: impl Into<String>) -> Self {
        Self::Type { name: name.into() }
    }

    /// Field symbol
    #[inline]
    #[must_use]
    pub fn field(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Field {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Method symbol
    #[must_use]
    pub fn method(owner: impl Into<String>, name: impl Into<String>, params: &[&str]) -> Self {
        Self::Method {
            owner: owner.into(),
            name: name.into(),
            params: params.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// Display name of the type this symbol lives on
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            Self::Type { name } => name,
            Self::Field { owner, .. } | Self::Method { owner, .. } => owner,
        }
    }

    /// Kind label used in diagnostics
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Type { .. } => "type",
            Self::Field { .. } => "field",
            Self::Method { .. } => "method",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name } => f.write_str(name),
            Self::Field { owner, name } => write!(f, "{owner}#{name}"),
            Self::Method {
                owner,
                name,
                params,
            } => write!(f, "{owner}#{name}({})", params.join(",")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_display_forms() {
        assert_eq!(Symbol::ty("a.B").to_string(), "a.B");
        assert_eq!(Symbol::field("a.B", "c").to_string(), "a.B#c");
        assert_eq!(
            Symbol::method("a.B", "get", &["int", "int"]).to_string(),
            "a.B#get(int,int)"
        );
        assert_eq!(Symbol::method("a.B", "run", &[]).to_string(), "a.B#run()");
    }

    #[test]
    fn symbol_owner() {
        assert_eq!(Symbol::field("a.B", "c").owner(), "a.B");
        assert_eq!(Symbol::ty("a.B").owner(), "a.B");
    }
}
