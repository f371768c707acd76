//! Isolated loading of the target's code units
//!
//! [`IsolatedLoader`] defines the target's types from a private
//! [`ModuleArchive`] in its own namespace. Exactly one designated type is
//! routed through a [`StructuralPatcher`] before it is defined; platform
//! namespaces always come from the parent loader.

use crate::patch::{PatchError, StructuralPatcher};
use crate::runtime::{ForeignRuntime, RuntimeError, TypeHandle};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use pregen_symbol::ReleaseId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Archive entry declaring the release the archive was built for
pub const VERSION_INFO: &str = "version.json";

/// Namespaces that are never defined privately
pub const PLATFORM_PREFIXES: &[&str] = &["java.", "javax.", "sun.", "com.sun.", "org.w3c.", "jdk."];

/// Loader failures
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// `designate` called a second time
    #[error("patch target already designated as {0}")]
    AlreadyDesignated(String),

    /// Designated type was defined unpatched before designation
    #[error("{0} was loaded before being designated for patching")]
    LoadedBeforeDesignation(String),

    /// Private type requested before any designation
    #[error("cannot load {0}: no patch target designated yet")]
    NotDesignated(String),

    /// Neither the archive nor the parent knows the type
    #[error("type {0} not found")]
    NotFound(String),

    /// Archive read failed
    #[error("failed to read {name} from archive: {source}")]
    Archive {
        /// Type name
        name: String,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// `version.json` is not a JSON object with a string `id`
    #[error("malformed {VERSION_INFO}: {0}")]
    VersionInfo(#[source] serde_json::Error),

    /// Designated type could not be patched
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Runtime rejected the type
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Loads types by binary name
pub trait ForeignModuleLoader: Send + Sync {
    /// Load (or return the already loaded) type
    ///
    /// # Errors
    /// Returns [`LoaderError`] if the type cannot be found or defined.
    fn load(&self, name: &str) -> Result<TypeHandle, LoaderError>;
}

/// Source of the target's type images
pub trait ModuleArchive: Send + Sync {
    /// Binary image of a type, `None` if the archive does not contain it
    ///
    /// # Errors
    /// Returns the IO error if the archive exists but cannot be read.
    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>>;

    /// Type declared as the archive's entry point
    fn entry_point(&self) -> Option<String>;

    /// Release the archive was built for, read from its `version.json`
    ///
    /// # Errors
    /// Returns [`LoaderError::Archive`] if the entry exists but cannot be
    /// read and [`LoaderError::VersionInfo`] if it is malformed.
    fn release_id(&self) -> Result<Option<ReleaseId>, LoaderError> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct VersionInfo {
    id: String,
}

fn parse_version_info(bytes: &[u8]) -> Result<ReleaseId, LoaderError> {
    let info: VersionInfo = serde_json::from_slice(bytes).map_err(LoaderError::VersionInfo)?;
    Ok(ReleaseId::new(info.id))
}

/// In-memory archive
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    images: HashMap<String, Vec<u8>>,
    entry_point: Option<String>,
    release: Option<ReleaseId>,
}

impl MemoryArchive {
    /// Create empty archive
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type image
    pub fn insert(&mut self, name: impl Into<String>, image: Vec<u8>) {
        self.images.insert(name.into(), image);
    }

    /// Declare entry point
    #[inline]
    #[must_use]
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    /// Declare the release the archive was built for
    #[inline]
    #[must_use]
    pub fn with_release_id(mut self, release: impl Into<ReleaseId>) -> Self {
        self.release = Some(release.into());
        self
    }

    /// Number of images
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if archive is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ModuleArchive for MemoryArchive {
    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.images.get(name).cloned())
    }

    fn entry_point(&self) -> Option<String> {
        self.entry_point.clone()
    }

    fn release_id(&self) -> Result<Option<ReleaseId>, LoaderError> {
        Ok(self.release.clone())
    }
}

/// Extracted archive on disk (`a/b/C.class`, `META-INF/MANIFEST.MF`,
/// `version.json`)
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    /// Create archive rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.push(format!("{}.class", name.replace('.', "/")));
        path
    }
}

impl ModuleArchive for DirectoryArchive {
    fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.image_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn entry_point(&self) -> Option<String> {
        let manifest = std::fs::read_to_string(self.root.join("META-INF").join("MANIFEST.MF")).ok()?;
        manifest.lines().find_map(|line| {
            line.strip_prefix("Main-Class:")
                .map(|value| value.trim().to_string())
        })
    }

    fn release_id(&self) -> Result<Option<ReleaseId>, LoaderError> {
        match std::fs::read(self.root.join(VERSION_INFO)) {
            Ok(bytes) => parse_version_info(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LoaderError::Archive {
                name: VERSION_INFO.to_string(),
                source,
            }),
        }
    }
}

/// Parent loader backed by the runtime's platform types
pub struct SystemLoader {
    runtime: Arc<dyn ForeignRuntime>,
}

impl SystemLoader {
    /// Create loader over runtime
    #[inline]
    #[must_use]
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Self {
        Self { runtime }
    }
}

impl ForeignModuleLoader for SystemLoader {
    fn load(&self, name: &str) -> Result<TypeHandle, LoaderError> {
        self.runtime
            .system_type(name)
            .ok_or_else(|| LoaderError::NotFound(name.to_string()))
    }
}

/// Check whether a name belongs to a platform namespace
#[inline]
#[must_use]
pub fn is_platform(name: &str) -> bool {
    PLATFORM_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Private-namespace loader with one patched type
pub struct IsolatedLoader {
    archive: Arc<dyn ModuleArchive>,
    runtime: Arc<dyn ForeignRuntime>,
    parent: Arc<dyn ForeignModuleLoader>,
    patcher: Arc<dyn StructuralPatcher>,
    designated: OnceCell<String>,
    loaded: Mutex<HashMap<String, TypeHandle>>,
}

impl IsolatedLoader {
    /// Create loader
    #[must_use]
    pub fn new(
        archive: Arc<dyn ModuleArchive>,
        runtime: Arc<dyn ForeignRuntime>,
        parent: Arc<dyn ForeignModuleLoader>,
        patcher: Arc<dyn StructuralPatcher>,
    ) -> Self {
        Self {
            archive,
            runtime,
            parent,
            patcher,
            designated: OnceCell::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Designate the single type to patch
    ///
    /// Must happen before the target's entry point runs.
    ///
    /// # Errors
    /// Returns [`LoaderError::AlreadyDesignated`] on a second call and
    /// [`LoaderError::LoadedBeforeDesignation`] if the type is already
    /// defined.
    pub fn designate(&self, name: &str) -> Result<(), LoaderError> {
        let loaded = self.loaded.lock();
        if loaded.contains_key(name) {
            return Err(LoaderError::LoadedBeforeDesignation(name.to_string()));
        }
        self.designated
            .set(name.to_string())
            .map_err(|_| LoaderError::AlreadyDesignated(self.designated().unwrap_or_default().to_string()))?;
        tracing::debug!(type_name = name, "designated patch target");
        Ok(())
    }

    /// Designated type, if set
    #[inline]
    #[must_use]
    pub fn designated(&self) -> Option<&str> {
        self.designated.get().map(String::as_str)
    }

    /// Entry point declared by the archive
    #[inline]
    #[must_use]
    pub fn entry_point(&self) -> Option<String> {
        self.archive.entry_point()
    }

    /// Check whether a type has been defined by this loader
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().contains_key(name)
    }
}

impl ForeignModuleLoader for IsolatedLoader {
    fn load(&self, name: &str) -> Result<TypeHandle, LoaderError> {
        if is_platform(name) {
            return self.parent.load(name);
        }

        let mut loaded = self.loaded.lock();
        if let Some(handle) = loaded.get(name) {
            return Ok(handle.clone());
        }

        let image = self.archive.read(name).map_err(|source| LoaderError::Archive {
            name: name.to_string(),
            source,
        })?;
        let Some(image) = image else {
            drop(loaded);
            return self.parent.load(name);
        };

        let handle = match self.designated() {
            None => return Err(LoaderError::NotDesignated(name.to_string())),
            Some(target) if target == name => {
                let patched = self.patcher.patch(name, &image)?;
                tracing::info!(type_name = name, "defining patched type");
                self.runtime.define_type(name, &patched)?
            }
            Some(_) => self.runtime.define_type(name, &image)?,
        };
        loaded.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

impl std::fmt::Debug for IsolatedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedLoader")
            .field("designated", &self.designated.get())
            .field("loaded", &self.loaded.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FieldHandle, MethodHandle, ObjectRef, Primitive, Value};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRuntime {
        defined: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ForeignRuntime for RecordingRuntime {
        fn primitive(&self, primitive: Primitive) -> TypeHandle {
            TypeHandle::new(0, primitive.name())
        }
        fn system_type(&self, name: &str) -> Option<TypeHandle> {
            name.starts_with("java.").then(|| TypeHandle::new(1, name))
        }
        fn define_type(&self, name: &str, image: &[u8]) -> Result<TypeHandle, RuntimeError> {
            let mut defined = self.defined.lock();
            defined.push((name.to_string(), image.to_vec()));
            Ok(TypeHandle::new(100 + defined.len() as u64, name))
        }
        fn field(&self, _: &TypeHandle, _: &str) -> Option<FieldHandle> {
            None
        }
        fn method(&self, _: &TypeHandle, _: &str, _: &[TypeHandle]) -> Option<MethodHandle> {
            None
        }
        fn entry_method(&self, _: &TypeHandle) -> Option<MethodHandle> {
            None
        }
        fn read_field(&self, f: &FieldHandle, _: Option<ObjectRef>) -> Result<Value, RuntimeError> {
            Err(RuntimeError::MissingReceiver(f.to_string()))
        }
        fn invoke(&self, m: &MethodHandle, _: Option<ObjectRef>, _: &[Value]) -> Result<Value, RuntimeError> {
            Err(RuntimeError::MissingReceiver(m.to_string()))
        }
        fn thread_alive(&self, _: &str) -> bool {
            false
        }
        fn join_thread(&self, _: &str, _: Duration) -> bool {
            true
        }
    }

    struct MarkingPatcher;

    impl StructuralPatcher for MarkingPatcher {
        fn patch(&self, _: &str, image: &[u8]) -> Result<Vec<u8>, PatchError> {
            let mut out = image.to_vec();
            out.extend_from_slice(b"+patched");
            Ok(out)
        }
    }

    struct FailingPatcher;

    impl StructuralPatcher for FailingPatcher {
        fn patch(&self, type_name: &str, _: &[u8]) -> Result<Vec<u8>, PatchError> {
            Err(PatchError::NoConstructor {
                type_name: type_name.to_string(),
            })
        }
    }

    fn loader_with(patcher: Arc<dyn StructuralPatcher>) -> (IsolatedLoader, Arc<RecordingRuntime>) {
        let runtime = Arc::new(RecordingRuntime::default());
        let mut archive = MemoryArchive::new();
        archive.insert("dg", b"server".to_vec());
        archive.insert("bx", b"base".to_vec());
        archive.insert("java.lang.Shadow", b"evil".to_vec());
        let parent = Arc::new(SystemLoader::new(runtime.clone()));
        let loader = IsolatedLoader::new(Arc::new(archive), runtime.clone(), parent, patcher);
        (loader, runtime)
    }

    #[test]
    fn only_designated_type_is_patched() {
        let (loader, runtime) = loader_with(Arc::new(MarkingPatcher));
        loader.designate("dg").unwrap();
        loader.load("dg").unwrap();
        loader.load("bx").unwrap();

        let defined = runtime.defined.lock();
        assert_eq!(defined[0], ("dg".to_string(), b"server+patched".to_vec()));
        assert_eq!(defined[1], ("bx".to_string(), b"base".to_vec()));
    }

    #[test]
    fn load_is_memoized() {
        let (loader, runtime) = loader_with(Arc::new(MarkingPatcher));
        loader.designate("dg").unwrap();
        let first = loader.load("bx").unwrap();
        let second = loader.load("bx").unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.defined.lock().len(), 1);
        assert!(loader.is_loaded("bx"));
    }

    #[test]
    fn platform_names_go_to_parent() {
        let (loader, runtime) = loader_with(Arc::new(MarkingPatcher));
        let handle = loader.load("java.lang.Shadow").unwrap();
        assert_eq!(handle.id(), 1);
        assert!(runtime.defined.lock().is_empty());
    }

    #[test]
    fn unknown_private_name_falls_back_to_parent() {
        let (loader, _) = loader_with(Arc::new(MarkingPatcher));
        loader.designate("dg").unwrap();
        assert!(matches!(loader.load("zz"), Err(LoaderError::NotFound(n)) if n == "zz"));
    }

    #[test]
    fn designate_twice_fails() {
        let (loader, _) = loader_with(Arc::new(MarkingPatcher));
        loader.designate("dg").unwrap();
        assert!(matches!(
            loader.designate("bx"),
            Err(LoaderError::AlreadyDesignated(existing)) if existing == "dg"
        ));
    }

    #[test]
    fn private_load_before_designation_fails() {
        let (loader, _) = loader_with(Arc::new(MarkingPatcher));
        assert!(matches!(loader.load("dg"), Err(LoaderError::NotDesignated(_))));
        assert!(!loader.is_loaded("dg"));
    }

    #[test]
    fn patch_failure_leaves_type_undefined() {
        let (loader, runtime) = loader_with(Arc::new(FailingPatcher));
        loader.designate("dg").unwrap();
        assert!(matches!(loader.load("dg"), Err(LoaderError::Patch(_))));
        assert!(runtime.defined.lock().is_empty());
        assert!(!loader.is_loaded("dg"));
    }

    #[test]
    fn directory_archive_reads_class_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("net/minecraft/server")).unwrap();
        std::fs::create_dir_all(dir.path().join("META-INF")).unwrap();
        std::fs::write(dir.path().join("net/minecraft/server/Main.class"), b"main").unwrap();
        std::fs::write(
            dir.path().join("META-INF/MANIFEST.MF"),
            "Manifest-Version: 1.0\nMain-Class: net.minecraft.server.Main\n",
        )
        .unwrap();

        let archive = DirectoryArchive::new(dir.path());
        assert_eq!(
            archive.read("net.minecraft.server.Main").unwrap(),
            Some(b"main".to_vec())
        );
        assert_eq!(archive.read("net.minecraft.server.Missing").unwrap(), None);
        assert_eq!(
            archive.entry_point().as_deref(),
            Some("net.minecraft.server.Main")
        );
        assert_eq!(archive.release_id().unwrap(), None);
    }

    #[test]
    fn directory_archive_reads_release_from_version_info() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(VERSION_INFO),
            r#"{"id": "1.16.1", "name": "1.16.1", "world_version": 2567, "stable": true}"#,
        )
        .unwrap();

        let archive = DirectoryArchive::new(dir.path());
        assert_eq!(archive.release_id().unwrap(), Some(ReleaseId::new("1.16.1")));
    }

    #[test]
    fn malformed_version_info_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERSION_INFO), r#"{"name": "1.16.1"}"#).unwrap();

        let err = DirectoryArchive::new(dir.path()).release_id().unwrap_err();
        assert!(matches!(err, LoaderError::VersionInfo(_)));
        assert!(err.to_string().contains(VERSION_INFO));
    }

    #[test]
    fn memory_archive_release_is_declared() {
        assert_eq!(MemoryArchive::new().release_id().unwrap(), None);
        let archive = MemoryArchive::new().with_release_id("20w22a");
        assert_eq!(archive.release_id().unwrap(), Some(ReleaseId::new("20w22a")));
    }
}
