//! From configuration to a prepared adapter
//!
//! [`TargetSetup`] gathers what the adapter needs before any runtime is
//! involved: the release (given, or read from the archive's `version.json`),
//! its mapping and the release catalog. The offline check runs on this
//! alone; launching additionally needs a [`ForeignRuntime`] hosting the
//! target.

use crate::check::{check_compatibility, CompatibilityReport};
use crate::config::{ConfigError, DriverConfig};
use crate::driver::Driver;
use crate::error::Result;
use crate::session::{Session, SessionOutcome};
use pregen_adapter::{
    detect_release, Adapter, AdapterParts, CommandSink, ForeignRuntime, ModuleArchive,
    SelectionPolicy,
};
use pregen_symbol::{CachedCatalog, CatalogOrder, ManifestFile, ReleaseId, ReleaseOrder, SymbolMap};
use std::path::Path;
use std::sync::Arc;

/// Mapping, catalog and archive of one target release
pub struct TargetSetup {
    symbols: Arc<SymbolMap>,
    order: Arc<dyn ReleaseOrder>,
    archive: Arc<dyn ModuleArchive>,
    policy: SelectionPolicy,
}

impl TargetSetup {
    /// Setup from parts already loaded
    #[must_use]
    pub fn new(
        symbols: Arc<SymbolMap>,
        order: Arc<dyn ReleaseOrder>,
        archive: Arc<dyn ModuleArchive>,
        policy: SelectionPolicy,
    ) -> Self {
        Self {
            symbols,
            order,
            archive,
            policy,
        }
    }

    /// Load the mapping of `release`, or of the release the archive declares
    ///
    /// # Errors
    /// Returns [`crate::DriverError::Compatibility`] if no release can be
    /// determined and [`crate::DriverError::Mapping`] if the mapping cannot
    /// be read.
    pub fn load(
        mapping: &Path,
        manifest: &Path,
        catalog_order: CatalogOrder,
        archive: Arc<dyn ModuleArchive>,
        release: Option<ReleaseId>,
        policy: SelectionPolicy,
    ) -> Result<Self> {
        let release = detect_release(release, archive.as_ref())?;
        let symbols = SymbolMap::load(release.clone(), mapping)?;
        tracing::info!(
            release = %release,
            types = symbols.type_count(),
            mapping = %mapping.display(),
            "loaded mapping"
        );
        let order = Arc::new(CachedCatalog::new(ManifestFile::new(manifest, catalog_order)));
        Ok(Self::new(Arc::new(symbols), order, archive, policy))
    }

    /// Load using the mapping, manifest and policy of `config`
    ///
    /// # Errors
    /// Returns [`crate::DriverError::Config`] if `mapping` or `manifest` is
    /// not configured, otherwise as [`TargetSetup::load`].
    pub fn from_config(
        config: &DriverConfig,
        archive: Arc<dyn ModuleArchive>,
        release: Option<ReleaseId>,
    ) -> Result<Self> {
        let mapping = config
            .mapping
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("mapping", "required to run the target"))?;
        let manifest = config
            .manifest
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("manifest", "required to run the target"))?;
        Self::load(
            mapping,
            manifest,
            config.catalog_order,
            archive,
            release,
            config.selection_policy(),
        )
    }

    /// Release being set up
    #[inline]
    #[must_use]
    pub fn release(&self) -> &ReleaseId {
        self.symbols.release()
    }

    /// Offline compatibility check
    ///
    /// # Errors
    /// Returns the first compatibility failure.
    pub fn check(&self) -> Result<CompatibilityReport> {
        Ok(check_compatibility(&self.symbols, self.order.as_ref(), self.policy)?)
    }

    /// Assemble and validate the adapter inside `runtime`
    ///
    /// # Errors
    /// Returns the first compatibility failure.
    pub fn prepare(self, runtime: Arc<dyn ForeignRuntime>) -> Result<Adapter> {
        let parts = AdapterParts::new(self.symbols, self.order, runtime, self.archive)?
            .with_policy(self.policy);
        Ok(Adapter::prepare(parts)?)
    }
}

impl std::fmt::Debug for TargetSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSetup")
            .field("release", self.release())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Drive one configured session on a prepared adapter
///
/// # Errors
/// Returns the first driver or store failure; the target is stopped either
/// way.
pub fn run_session(
    adapter: &Adapter,
    console: Option<Arc<dyn CommandSink>>,
    config: &DriverConfig,
    args: &[String],
) -> Result<SessionOutcome> {
    let mut driver = Driver::for_adapter(adapter).with_settings(config.settings());
    if let Some(console) = console {
        driver = driver.with_console(console);
    }
    Session::new(Arc::new(driver), config).run(args)
}
