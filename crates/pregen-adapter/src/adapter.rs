//! Adapter assembly
//!
//! Wires the symbol map, loader, patcher, resolver and manager together in
//! the order the target requires:
//!
//! 1. check the release against the catalog, the archive and the support
//!    floor
//! 2. resolve the mangled name of the server type
//! 3. designate it for patching in the isolated loader
//! 4. validate every capability eagerly
//!
//! Only then may the entry point be launched.

use crate::error::{CompatibilityError, Result};
use crate::launch::{Launcher, TargetProcess};
use crate::loader::{IsolatedLoader, ModuleArchive, SystemLoader};
use crate::manager::{CapabilityManager, TargetOps};
use crate::patch::{InstanceFieldPatcher, StructuralPatcher};
use crate::registry::{CapabilityRegistry, SelectionPolicy, SupportFloor};
use crate::resolver::MappedResolver;
use crate::runtime::ForeignRuntime;
use crate::types::TypeCache;
use pregen_symbol::{ReleaseId, ReleaseOrder, SymbolMap};
use std::sync::Arc;

/// Inputs to [`Adapter::prepare`]
pub struct AdapterParts {
    /// Mapping of the running release
    pub symbols: Arc<SymbolMap>,
    /// Release order
    pub order: Arc<dyn ReleaseOrder>,
    /// Runtime hosting the target
    pub runtime: Arc<dyn ForeignRuntime>,
    /// Target's code units
    pub archive: Arc<dyn ModuleArchive>,
    /// Patcher for the server type
    pub patcher: Arc<dyn StructuralPatcher>,
    /// Registered variants
    pub registry: CapabilityRegistry,
    /// Selection policy
    pub policy: SelectionPolicy,
    /// Oldest supported releases
    pub floor: SupportFloor,
}

impl AdapterParts {
    /// Parts with the built-in registry, instance patcher and strict policy
    ///
    /// # Errors
    /// Returns [`CompatibilityError::Registry`] if the built-in registry is
    /// inconsistent.
    pub fn new(
        symbols: Arc<SymbolMap>,
        order: Arc<dyn ReleaseOrder>,
        runtime: Arc<dyn ForeignRuntime>,
        archive: Arc<dyn ModuleArchive>,
    ) -> Result<Self> {
        Ok(Self {
            symbols,
            order,
            runtime,
            archive,
            patcher: Arc::new(InstanceFieldPatcher::default()),
            registry: CapabilityRegistry::builtin()?,
            policy: SelectionPolicy::STRICT,
            floor: SupportFloor::builtin(),
        })
    }

    /// Set selection policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set support floor
    #[inline]
    #[must_use]
    pub fn with_floor(mut self, floor: SupportFloor) -> Self {
        self.floor = floor;
        self
    }
}

/// Release to run: the given one, else the one the archive declares
///
/// # Errors
/// - [`CompatibilityError::ReleaseUnknown`] if neither is available
/// - [`CompatibilityError::ReleaseMismatch`] if both are and they differ
/// - [`CompatibilityError::ReleaseInfo`] if the archive's declaration
///   cannot be read
pub fn detect_release(given: Option<ReleaseId>, archive: &dyn ModuleArchive) -> Result<ReleaseId> {
    let declared = archive.release_id().map_err(CompatibilityError::ReleaseInfo)?;
    match (given, declared) {
        (Some(given), Some(declared)) if given != declared => Err(CompatibilityError::ReleaseMismatch {
            mapping: given,
            archive: declared,
        }),
        (Some(release), _) | (None, Some(release)) => Ok(release),
        (None, None) => Err(CompatibilityError::ReleaseUnknown),
    }
}

/// Validated adapter, ready to launch the target
pub struct Adapter {
    manager: Arc<CapabilityManager>,
    launcher: Arc<Launcher>,
    loader: Arc<IsolatedLoader>,
    types: Arc<TypeCache>,
}

impl Adapter {
    /// Assemble and validate
    ///
    /// # Errors
    /// - [`CompatibilityError::Catalog`] if the release is not in the catalog
    /// - [`CompatibilityError::ReleaseMismatch`] if the archive declares a
    ///   different release than the mapping
    /// - [`CompatibilityError::BelowSupportFloor`] if the release is too old
    /// - any capability selection or validation failure
    pub fn prepare(parts: AdapterParts) -> Result<Self> {
        let AdapterParts {
            symbols,
            order,
            runtime,
            archive,
            patcher,
            registry,
            policy,
            floor,
        } = parts;
        let release = detect_release(Some(symbols.release().clone()), archive.as_ref())?;
        order.compare(&release, &release)?;
        floor.check(&release, order.as_ref(), policy)?;

        let parent = Arc::new(SystemLoader::new(Arc::clone(&runtime)));
        let loader = Arc::new(IsolatedLoader::new(archive, Arc::clone(&runtime), parent, patcher));
        let types = Arc::new(TypeCache::new(
            Arc::clone(&symbols),
            loader.clone(),
            runtime.as_ref(),
        ));
        let resolver = Arc::new(MappedResolver::new(
            symbols,
            Arc::clone(&types),
            Arc::clone(&runtime),
        ));
        let launcher = Arc::new(Launcher::new(Arc::clone(&loader), Arc::clone(&runtime)));
        let manager = Arc::new(
            CapabilityManager::new(release, registry, order, resolver, runtime, launcher.clone())
                .with_policy(policy),
        );

        let server_type = manager.server_type_name()?;
        loader
            .designate(&server_type)
            .map_err(|source| CompatibilityError::Load {
                type_name: server_type.clone(),
                source,
            })?;
        manager.validate_all()?;
        tracing::info!(
            release = %manager.release(),
            server_type = %server_type,
            types = types.len(),
            "adapter ready"
        );

        Ok(Self {
            manager,
            launcher,
            loader,
            types,
        })
    }

    /// Capability manager
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<CapabilityManager> {
        &self.manager
    }

    /// Loader holding the target's types
    #[inline]
    #[must_use]
    pub fn loader(&self) -> &Arc<IsolatedLoader> {
        &self.loader
    }

    /// Loaded type cache
    #[inline]
    #[must_use]
    pub fn types(&self) -> &Arc<TypeCache> {
        &self.types
    }

    /// Target operations for the driver
    #[must_use]
    pub fn ops(&self) -> Arc<dyn TargetOps> {
        self.manager.clone()
    }

    /// Target process for the driver
    #[must_use]
    pub fn process(&self) -> Arc<dyn TargetProcess> {
        self.launcher.clone()
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("manager", &self.manager)
            .field("launcher", &self.launcher)
            .field("types", &self.types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryArchive;

    #[test]
    fn release_comes_from_archive_when_not_given() {
        let archive = MemoryArchive::new().with_release_id("1.16.1");
        assert_eq!(detect_release(None, &archive).unwrap().as_str(), "1.16.1");
        assert_eq!(
            detect_release(Some("1.16.1".into()), &archive).unwrap().as_str(),
            "1.16.1"
        );
    }

    #[test]
    fn given_release_is_used_when_archive_declares_none() {
        let release = detect_release(Some("20w22a".into()), &MemoryArchive::new()).unwrap();
        assert_eq!(release.as_str(), "20w22a");
    }

    #[test]
    fn no_release_anywhere_is_unknown() {
        let err = detect_release(None, &MemoryArchive::new()).unwrap_err();
        assert!(matches!(err, CompatibilityError::ReleaseUnknown));
    }

    #[test]
    fn disagreeing_releases_are_a_mismatch() {
        let archive = MemoryArchive::new().with_release_id("1.16");
        let err = detect_release(Some("1.14.4".into()), &archive).unwrap_err();
        assert!(matches!(
            err,
            CompatibilityError::ReleaseMismatch { ref mapping, ref archive }
                if mapping.as_str() == "1.14.4" && archive.as_str() == "1.16"
        ));
    }
}
