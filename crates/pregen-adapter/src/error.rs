//! Error types for the compatibility adapter
//!
//! Every failure here is fatal for the run: nothing is retried and every
//! message names the symbol and release involved.

use crate::capability::Contract;
use crate::loader::LoaderError;
use crate::patch::PatchError;
use crate::runtime::RuntimeError;
use pregen_symbol::{CatalogError, MappingNotFound, ReleaseId, Symbol};

/// Adapter result alias
pub type Result<T, E = CompatibilityError> = std::result::Result<T, E>;

/// Main adapter error type
#[derive(Debug, thiserror::Error)]
pub enum CompatibilityError {
    /// Symbolic name absent from the release's mapping
    #[error(transparent)]
    MappingNotFound(#[from] MappingNotFound),

    /// Mapped name does not exist in the loaded binary
    #[error("{} {symbol} (mapped to {mangled}) not found in release {release}", symbol.kind())]
    MemberNotFound {
        /// Symbolic name
        symbol: Symbol,
        /// Mangled name that was looked up
        mangled: String,
        /// Running release
        release: ReleaseId,
    },

    /// No variant of a contract covers the running release
    #[error("no implementation of {contract} supports release {release}")]
    UnsupportedRelease {
        /// Contract being selected
        contract: Contract,
        /// Running release
        release: ReleaseId,
    },

    /// Target object is not (yet) reachable
    #[error("target unavailable: {0}")]
    TargetUnavailable(String),

    /// Designated type could not be patched
    #[error("failed to patch {type_name}: {source}")]
    PatchFailure {
        /// Type being patched
        type_name: String,
        /// Reason
        #[source]
        source: PatchError,
    },

    /// Type could not be loaded for a reason other than absence or patching
    #[error("failed to load {type_name}: {source}")]
    Load {
        /// Type being loaded
        type_name: String,
        /// Loader failure
        #[source]
        source: LoaderError,
    },

    /// Release unknown to the catalog
    #[error("release catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Release predates the oldest supported release
    #[error("release {release} predates the oldest supported release {floor}")]
    BelowSupportFloor {
        /// Running release
        release: ReleaseId,
        /// Oldest release accepted after the exact ones
        floor: ReleaseId,
    },

    /// No release given and the archive does not declare one
    #[error("no release given and the target archive has no version.json")]
    ReleaseUnknown,

    /// Mapping and archive disagree on the release
    #[error("mapping is for release {mapping} but the target archive is release {archive}")]
    ReleaseMismatch {
        /// Release of the mapping
        mapping: ReleaseId,
        /// Release declared by the archive
        archive: ReleaseId,
    },

    /// Archive's release declaration could not be read
    #[error("failed to read the target archive's release: {0}")]
    ReleaseInfo(#[source] LoaderError),

    /// Variant registration error
    #[error("registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    /// Read or call raised inside the target
    #[error("call to {member} failed: {source}")]
    Runtime {
        /// Member that was used
        member: String,
        /// Runtime failure
        #[source]
        source: RuntimeError,
    },

    /// Bridge produced an output of the wrong shape
    #[error("{contract} returned {actual}, expected {expected}")]
    ContractViolation {
        /// Contract that was invoked
        contract: Contract,
        /// Expected output shape
        expected: &'static str,
        /// Actual output shape
        actual: String,
    },
}

impl CompatibilityError {
    /// Create runtime error for a member
    #[inline]
    pub fn runtime(member: impl ToString, source: RuntimeError) -> Self {
        Self::Runtime {
            member: member.to_string(),
            source,
        }
    }

    /// Map a loader failure for `symbol` (mapped to `mangled`)
    #[must_use]
    pub fn from_loader(symbol: &str, mangled: &str, release: &ReleaseId, err: LoaderError) -> Self {
        match err {
            LoaderError::NotFound(_) => Self::MemberNotFound {
                symbol: Symbol::ty(symbol),
                mangled: mangled.to_string(),
                release: release.clone(),
            },
            LoaderError::Patch(source) => Self::PatchFailure {
                type_name: mangled.to_string(),
                source,
            },
            other => Self::Load {
                type_name: mangled.to_string(),
                source: other,
            },
        }
    }

    /// Check if error means the target process is gone or not up yet
    #[inline]
    #[must_use]
    pub fn is_target_unavailable(&self) -> bool {
        matches!(self, Self::TargetUnavailable(_))
    }
}

/// Failures starting the target's entry point
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Archive declares no entry point
    #[error("target archive declares no entry point")]
    NoEntryPoint,

    /// Entry type could not be loaded
    #[error("failed to load entry type {name}: {source}")]
    Load {
        /// Entry type
        name: String,
        /// Loader failure
        #[source]
        source: LoaderError,
    },

    /// Entry type has no static entry method
    #[error("entry type {0} has no entry method")]
    MissingEntryMethod(String),

    /// Entry method raised
    #[error("entry point raised: {0}")]
    EntryPoint(#[source] RuntimeError),
}
