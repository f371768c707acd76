//! pregen symbol layer
//!
//! Release-specific name mapping for a target binary whose internal names
//! are mangled differently in every release.
//!
//! # Overview
//!
//! - **SymbolMap**: symbolic name → mangled identifier for one release
//! - **ReleaseCatalog**: chronological order over release identifiers
//! - **CachedCatalog**: load-once catalog with a single forced refresh
//!
//! # Example
//!
//! ```rust
//! use pregen_symbol::{ReleaseCatalog, ReleaseId, ReleaseOrder, SymbolMap};
//!
//! let map = SymbolMap::parse_str(
//!     ReleaseId::new("1.14.4"),
//!     "net.minecraft.world.level.Level -> bhr:\n    int seaLevel -> a\n",
//! );
//! assert_eq!(map.resolve_type("net.minecraft.world.level.Level").unwrap(), "bhr");
//!
//! let catalog = ReleaseCatalog::chronological(["1.14.4", "1.15"]);
//! assert!(catalog
//!     .compare(&ReleaseId::new("1.14.4"), &ReleaseId::new("1.15"))
//!     .unwrap()
//!     .is_lt());
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod map;
pub mod release;
pub mod symbol;

// Re-exports
pub use catalog::{
    CachedCatalog, CatalogError, CatalogOrder, CatalogSource, ManifestFile, ReleaseCatalog,
    ReleaseOrder, ReleaseRecord,
};
pub use map::{MapError, MappingNotFound, SymbolMap};
pub use release::ReleaseId;
pub use symbol::Symbol;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for symbol lookups
    pub use crate::{
        MappingNotFound, ReleaseCatalog, ReleaseId, ReleaseOrder, Symbol, SymbolMap,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
