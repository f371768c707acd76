//! pregen version-compatibility adapter
//!
//! Lets the driver talk to many releases of a target whose internal names are
//! mangled per release and whose structure shifts between versions.
//!
//! # Overview
//!
//! - **Runtime seam**: [`ForeignRuntime`] defines types and performs reads
//!   and calls inside the managed runtime hosting the target
//! - **Isolated loader**: loads the target privately, patching one type
//! - **Structural patcher**: injects a static back-reference to the server
//! - **Resolver**: symbolic names → typed handles, the only dynamic lookup
//! - **Capabilities**: per-contract variants selected by release
//! - **Manager**: validates every capability before the target starts
//!
//! # Example
//!
//! ```rust
//! use pregen_adapter::{CapabilityRegistry, Contract, SelectionPolicy};
//! use pregen_symbol::ReleaseCatalog;
//!
//! let registry = CapabilityRegistry::builtin().unwrap();
//! let catalog = ReleaseCatalog::chronological(["1.14.4", "20w20b", "20w21a", "20w22a", "1.16"]);
//! let variant = registry
//!     .select(Contract::DimensionField, &"20w21a".into(), &catalog, SelectionPolicy::STRICT)
//!     .unwrap();
//! assert_eq!(variant.name(), "location-suffix");
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod capability;
pub mod dimension;
pub mod error;
pub mod launch;
pub mod loader;
pub mod manager;
pub mod patch;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod slot;
pub mod types;

// Re-exports
pub use adapter::{detect_release, Adapter, AdapterParts};
pub use capability::{Capability, CapabilityContext, Contract, Input, Output, TargetHost, Variant};
pub use dimension::{Dimension, UnknownDimension};
pub use error::{CompatibilityError, LaunchError, Result};
pub use launch::{CommandSink, Launcher, TargetProcess, SERVER_THREAD};
pub use loader::{
    DirectoryArchive, ForeignModuleLoader, IsolatedLoader, LoaderError, MemoryArchive,
    ModuleArchive, SystemLoader, VERSION_INFO,
};
pub use manager::{CapabilityManager, TargetOps};
pub use patch::{InstanceFieldPatcher, PatchError, StructuralPatcher, INSTANCE_FIELD};
pub use registry::{CapabilityRegistry, RegistryError, SelectionPolicy, SupportFloor, VariantSpec};
pub use resolver::{MappedResolver, SymbolResolver};
pub use runtime::{
    FieldHandle, ForeignRuntime, MethodHandle, ObjectRef, Primitive, RuntimeError, TypeHandle,
    Value,
};
pub use slot::InstanceSlot;
pub use types::TypeCache;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a target through the adapter
    pub use crate::{
        Adapter, AdapterParts, CompatibilityError, Contract, Dimension, SelectionPolicy,
        TargetOps, TargetProcess,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
