//! Release catalog
//!
//! Orders [`ReleaseId`]s by their position in a published version manifest.
//! Release identifiers mix numbered releases and weekly snapshots
//! (`1.16`, `20w22a`, `1.16-pre1`), so lexical comparison is meaningless;
//! only catalog position counts.
//!
//! The manifest is loaded once through a [`CatalogSource`]; a lookup of an
//! absent identifier forces at most one refresh per process
//! ([`CachedCatalog`]).

use crate::release::ReleaseId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Identifier not present in the catalog
    #[error("release {0} is not in the release catalog")]
    UnknownRelease(ReleaseId),

    /// Manifest could not be read
    #[error("failed to read release manifest {path}: {source}")]
    Io {
        /// Manifest path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// Manifest is not valid JSON of the expected shape
    #[error("malformed release manifest: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Total order over release identifiers
pub trait ReleaseOrder: Send + Sync {
    /// Compare two releases chronologically
    ///
    /// # Errors
    /// Returns [`CatalogError::UnknownRelease`] if either id is unknown.
    fn compare(&self, a: &ReleaseId, b: &ReleaseId) -> Result<Ordering, CatalogError>;
}

/// Direction in which a manifest lists its releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOrder {
    /// Oldest release first
    Chronological,
    /// Newest release first, as the public launcher manifest does
    #[default]
    NewestFirst,
}

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Release identifier
    pub id: ReleaseId,
    /// Release channel (`release`, `snapshot`, ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Per-release metadata document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReleaseRecord {
    /// Record carrying only an identifier
    #[inline]
    #[must_use]
    pub fn bare(id: impl Into<ReleaseId>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    versions: Vec<ReleaseRecord>,
}

/// Chronologically ordered release catalog
#[derive(Debug, Clone, Default)]
pub struct ReleaseCatalog {
    releases: Vec<ReleaseRecord>,
    index: HashMap<ReleaseId, usize>,
}

impl ReleaseCatalog {
    /// Build catalog from records listed in `order`
    #[must_use]
    pub fn new(records: Vec<ReleaseRecord>, order: CatalogOrder) -> Self {
        let mut releases = records;
        if order == CatalogOrder::NewestFirst {
            releases.reverse();
        }
        let mut index = HashMap::with_capacity(releases.len());
        for (position, record) in releases.iter().enumerate() {
            index.entry(record.id.clone()).or_insert(position);
        }
        Self { releases, index }
    }

    /// Build catalog from identifiers, oldest first
    #[must_use]
    pub fn chronological<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ReleaseId>,
    {
        let records = ids.into_iter().map(ReleaseRecord::bare).collect();
        Self::new(records, CatalogOrder::Chronological)
    }

    /// Parse a JSON version manifest (`{"versions": [...]}`)
    ///
    /// # Errors
    /// Returns [`CatalogError::Malformed`] if the document does not parse.
    pub fn from_manifest_json(text: &str, order: CatalogOrder) -> Result<Self, CatalogError> {
        let manifest: Manifest = serde_json::from_str(text)?;
        Ok(Self::new(manifest.versions, order))
    }

    /// Chronological position of a release
    #[inline]
    #[must_use]
    pub fn position(&self, id: &ReleaseId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Check whether a release is listed
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ReleaseId) -> bool {
        self.index.contains_key(id)
    }

    /// Record for a release
    #[must_use]
    pub fn record(&self, id: &ReleaseId) -> Option<&ReleaseRecord> {
        self.position(id).map(|p| &self.releases[p])
    }

    /// Newest release
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&ReleaseRecord> {
        self.releases.last()
    }

    /// Number of releases
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Check if catalog is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Iterate releases oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ReleaseRecord> {
        self.releases.iter()
    }

    fn require(&self, id: &ReleaseId) -> Result<usize, CatalogError> {
        self.position(id)
            .ok_or_else(|| CatalogError::UnknownRelease(id.clone()))
    }
}

impl ReleaseOrder for ReleaseCatalog {
    fn compare(&self, a: &ReleaseId, b: &ReleaseId) -> Result<Ordering, CatalogError> {
        Ok(self.require(a)?.cmp(&self.require(b)?))
    }
}

/// Where a catalog comes from
pub trait CatalogSource: Send + Sync {
    /// Load a fresh copy of the catalog
    ///
    /// # Errors
    /// Returns [`CatalogError`] if the catalog cannot be read or parsed.
    fn load(&self) -> Result<ReleaseCatalog, CatalogError>;
}

/// Version manifest stored on disk
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
    order: CatalogOrder,
}

impl ManifestFile {
    /// Create source for manifest at path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, order: CatalogOrder) -> Self {
        Self {
            path: path.into(),
            order,
        }
    }

    /// Manifest path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for ManifestFile {
    fn load(&self) -> Result<ReleaseCatalog, CatalogError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        let catalog = ReleaseCatalog::from_manifest_json(&text, self.order)?;
        tracing::debug!(path = %self.path.display(), releases = catalog.len(), "loaded release manifest");
        Ok(catalog)
    }
}

impl CatalogSource for ReleaseCatalog {
    fn load(&self) -> Result<ReleaseCatalog, CatalogError> {
        Ok(self.clone())
    }
}

/// Process-lifetime catalog cache with one forced refresh
///
/// The first lookup loads the catalog. A lookup of an id the cached copy
/// does not list reloads the source once; later misses fail immediately.
pub struct CachedCatalog<S> {
    source: S,
    current: RwLock<Option<Arc<ReleaseCatalog>>>,
    refreshed: AtomicBool,
}

impl<S: CatalogSource> CachedCatalog<S> {
    /// Create cache over source
    #[inline]
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refreshed: AtomicBool::new(false),
        }
    }

    /// Current catalog, loading it on first use
    ///
    /// # Errors
    /// Propagates source failures.
    pub fn catalog(&self) -> Result<Arc<ReleaseCatalog>, CatalogError> {
        if let Some(catalog) = self.current.read().as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let mut slot = self.current.write();
        if let Some(catalog) = slot.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(self.source.load()?);
        *slot = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Position of release, refreshing once if absent
    ///
    /// # Errors
    /// Returns [`CatalogError::UnknownRelease`] if the id is missing even
    /// after the single refresh.
    pub fn position(&self, id: &ReleaseId) -> Result<usize, CatalogError> {
        if let Some(position) = self.catalog()?.position(id) {
            return Ok(position);
        }
        if self.refreshed.swap(true, AtomicOrdering::SeqCst) {
            return Err(CatalogError::UnknownRelease(id.clone()));
        }
        tracing::info!(release = %id, "release missing from catalog, refreshing");
        let fresh = Arc::new(self.source.load()?);
        *self.current.write() = Some(Arc::clone(&fresh));
        fresh
            .position(id)
            .ok_or_else(|| CatalogError::UnknownRelease(id.clone()))
    }
}

impl<S: CatalogSource> ReleaseOrder for CachedCatalog<S> {
    fn compare(&self, a: &ReleaseId, b: &ReleaseId) -> Result<Ordering, CatalogError> {
        let left = self.position(a)?;
        let right = self.position(b)?;
        Ok(left.cmp(&right))
    }
}

impl<S> std::fmt::Debug for CachedCatalog<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCatalog")
            .field("loaded", &self.current.read().is_some())
            .field("refreshed", &self.refreshed.load(AtomicOrdering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn id(s: &str) -> ReleaseId {
        ReleaseId::new(s)
    }

    #[test]
    fn compare_by_position() {
        let catalog = ReleaseCatalog::chronological(["a", "b", "c"]);
        assert_eq!(catalog.compare(&id("a"), &id("b")).unwrap(), Ordering::Less);
        assert_eq!(catalog.compare(&id("c"), &id("a")).unwrap(), Ordering::Greater);
        assert_eq!(catalog.compare(&id("b"), &id("b")).unwrap(), Ordering::Equal);
    }

    #[test]
    fn compare_ignores_lexical_order() {
        let catalog = ReleaseCatalog::chronological(["1.14.4", "19w36a", "1.15", "20w22a", "1.16"]);
        assert_eq!(
            catalog.compare(&id("1.16"), &id("20w22a")).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            catalog.compare(&id("19w36a"), &id("1.15")).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn compare_unknown_release_fails() {
        let catalog = ReleaseCatalog::chronological(["a"]);
        let err = catalog.compare(&id("a"), &id("zz")).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownRelease(r) if r == id("zz")));
    }

    #[test]
    fn manifest_newest_first_is_reversed() {
        let json = r#"{
            "latest": {"release": "1.16", "snapshot": "1.16"},
            "versions": [
                {"id": "1.16", "type": "release", "url": "https://example.invalid/1.16.json"},
                {"id": "20w22a", "type": "snapshot"},
                {"id": "1.15.2", "type": "release"}
            ]
        }"#;
        let catalog = ReleaseCatalog::from_manifest_json(json, CatalogOrder::NewestFirst).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.position(&id("1.15.2")), Some(0));
        assert_eq!(catalog.latest().unwrap().id, id("1.16"));
        assert_eq!(
            catalog.record(&id("1.16")).unwrap().url.as_deref(),
            Some("https://example.invalid/1.16.json")
        );
        assert_eq!(
            catalog.compare(&id("20w22a"), &id("1.16")).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn malformed_manifest() {
        let err = ReleaseCatalog::from_manifest_json("{\"nope\": 1}", CatalogOrder::Chronological)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Malformed(_)));
    }

    struct CountingSource {
        loads: Mutex<Vec<ReleaseCatalog>>,
        calls: Mutex<usize>,
    }

    impl CatalogSource for CountingSource {
        fn load(&self) -> Result<ReleaseCatalog, CatalogError> {
            *self.calls.lock() += 1;
            let mut loads = self.loads.lock();
            let next = if loads.len() > 1 {
                loads.remove(0)
            } else {
                loads[0].clone()
            };
            Ok(next)
        }
    }

    #[test]
    fn cached_catalog_refreshes_once_for_missing_release() {
        let source = CountingSource {
            loads: Mutex::new(vec![
                ReleaseCatalog::chronological(["a", "b"]),
                ReleaseCatalog::chronological(["a", "b", "c"]),
            ]),
            calls: Mutex::new(0),
        };
        let cached = CachedCatalog::new(source);

        assert_eq!(cached.position(&id("b")).unwrap(), 1);
        assert_eq!(*cached.source.calls.lock(), 1);

        assert_eq!(cached.position(&id("c")).unwrap(), 2);
        assert_eq!(*cached.source.calls.lock(), 2);

        assert!(cached.position(&id("d")).is_err());
        assert_eq!(*cached.source.calls.lock(), 2);
    }

    #[test]
    fn manifest_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version_manifest.json");
        std::fs::write(&path, r#"{"versions":[{"id":"b"},{"id":"a"}]}"#).unwrap();
        let cached = CachedCatalog::new(ManifestFile::new(&path, CatalogOrder::NewestFirst));
        assert_eq!(cached.compare(&id("a"), &id("b")).unwrap(), Ordering::Less);
    }

    #[test]
    fn manifest_file_missing() {
        let source = ManifestFile::new("/nonexistent/manifest.json", CatalogOrder::NewestFirst);
        assert!(matches!(source.load(), Err(CatalogError::Io { .. })));
    }
}
