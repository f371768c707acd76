//! Loaded type cache
//!
//! Symbolic type name → loaded [`TypeHandle`], resolved through the symbol
//! map and loaded through the isolated loader at most once per name.

use crate::error::{CompatibilityError, Result};
use crate::loader::ForeignModuleLoader;
use crate::runtime::{ForeignRuntime, Primitive, TypeHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pregen_symbol::SymbolMap;
use std::sync::Arc;

/// Write-once cache of loaded types, keyed by symbolic name
pub struct TypeCache {
    symbols: Arc<SymbolMap>,
    loader: Arc<dyn ForeignModuleLoader>,
    types: DashMap<String, TypeHandle>,
}

impl TypeCache {
    /// Create cache pre-seeded with the runtime's `int`
    #[must_use]
    pub fn new(
        symbols: Arc<SymbolMap>,
        loader: Arc<dyn ForeignModuleLoader>,
        runtime: &dyn ForeignRuntime,
    ) -> Self {
        let types = DashMap::new();
        let int = runtime.primitive(Primitive::Int);
        types.insert(Primitive::Int.name().to_string(), int);
        Self {
            symbols,
            loader,
            types,
        }
    }

    /// Get or load a type by symbolic name
    ///
    /// # Errors
    /// - [`CompatibilityError::MappingNotFound`] if the name is not mapped
    /// - [`CompatibilityError::MemberNotFound`] if the mapped type is absent
    /// - [`CompatibilityError::PatchFailure`] if it is the designated type and
    ///   patching fails
    pub fn get(&self, symbolic: &str) -> Result<TypeHandle> {
        if let Some(handle) = self.types.get(symbolic) {
            return Ok(handle.clone());
        }

        match self.types.entry(symbolic.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let mangled = self.symbols.resolve_type(symbolic)?;
                let handle = self.loader.load(mangled).map_err(|err| {
                    CompatibilityError::from_loader(symbolic, mangled, self.symbols.release(), err)
                })?;
                tracing::debug!(symbol = symbolic, mangled, "loaded type");
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Check whether a type has been loaded already
    #[inline]
    #[must_use]
    pub fn contains(&self, symbolic: &str) -> bool {
        self.types.contains_key(symbolic)
    }

    /// Number of cached types (including `int`)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if cache is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::fmt::Debug for TypeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCache")
            .field("release", self.symbols.release())
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderError;
    use crate::runtime::{FieldHandle, MethodHandle, ObjectRef, RuntimeError, Value};
    use parking_lot::Mutex;
    use pregen_symbol::ReleaseId;
    use std::time::Duration;

    struct PrimitiveRuntime;

    impl ForeignRuntime for PrimitiveRuntime {
        fn primitive(&self, primitive: Primitive) -> TypeHandle {
            TypeHandle::new(0, primitive.name())
        }
        fn system_type(&self, _: &str) -> Option<TypeHandle> {
            None
        }
        fn define_type(&self, name: &str, _: &[u8]) -> std::result::Result<TypeHandle, RuntimeError> {
            Err(RuntimeError::DuplicateType(name.to_string()))
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
        fn read_field(&self, f: &FieldHandle, _: Option<ObjectRef>) -> std::result::Result<Value, RuntimeError> {
            Err(RuntimeError::MissingReceiver(f.to_string()))
        }
        fn invoke(&self, m: &MethodHandle, _: Option<ObjectRef>, _: &[Value]) -> std::result::Result<Value, RuntimeError> {
            Err(RuntimeError::MissingReceiver(m.to_string()))
        }
        fn thread_alive(&self, _: &str) -> bool {
            false
        }
        fn join_thread(&self, _: &str, _: Duration) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: Mutex<Vec<String>>,
    }

    impl ForeignModuleLoader for CountingLoader {
        fn load(&self, name: &str) -> std::result::Result<TypeHandle, LoaderError> {
            self.calls.lock().push(name.to_string());
            if name == "bhr" {
                Ok(TypeHandle::new(7, name))
            } else {
                Err(LoaderError::NotFound(name.to_string()))
            }
        }
    }

    const MAPPING: &str = "\
net.minecraft.world.level.Level -> bhr:
net.minecraft.world.level.chunk.Gone -> zz:
";

    fn cache() -> (TypeCache, Arc<CountingLoader>) {
        let symbols = Arc::new(SymbolMap::parse_str(ReleaseId::new("1.14.4"), MAPPING));
        let loader = Arc::new(CountingLoader::default());
        (TypeCache::new(symbols, loader.clone(), &PrimitiveRuntime), loader)
    }

    #[test]
    fn int_is_preseeded() {
        let (cache, loader) = cache();
        assert_eq!(cache.get("int").unwrap().name(), "int");
        assert!(loader.calls.lock().is_empty());
    }

    #[test]
    fn loads_once_per_name() {
        let (cache, loader) = cache();
        let first = cache.get("net.minecraft.world.level.Level").unwrap();
        let second = cache.get("net.minecraft.world.level.Level").unwrap();
        assert_eq!(first, second);
        assert_eq!(*loader.calls.lock(), vec!["bhr".to_string()]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn unmapped_name_is_mapping_not_found() {
        let (cache, loader) = cache();
        let err = cache.get("net.minecraft.Unknown").unwrap_err();
        assert!(matches!(err, CompatibilityError::MappingNotFound(_)));
        assert!(loader.calls.lock().is_empty());
        assert!(!cache.contains("net.minecraft.Unknown"));
    }

    #[test]
    fn mapped_but_missing_is_member_not_found() {
        let (cache, _) = cache();
        let err = cache.get("net.minecraft.world.level.chunk.Gone").unwrap_err();
        assert!(matches!(
            err,
            CompatibilityError::MemberNotFound { ref mangled, .. } if mangled == "zz"
        ));
    }
}
