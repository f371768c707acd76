//! Symbolic name resolution
//!
//! [`SymbolResolver`] is the only place where member lookup by name happens.
//! Capabilities ask it for typed handles during setup and never look up
//! members themselves.

use crate::error::{CompatibilityError, Result};
use crate::runtime::{FieldHandle, ForeignRuntime, MethodHandle, Primitive, TypeHandle};
use crate::types::TypeCache;
use pregen_symbol::{ReleaseId, Symbol, SymbolMap};
use std::sync::Arc;

/// Turns symbolic names into typed handles or explicit failures
pub trait SymbolResolver: Send + Sync {
    /// Release the names are resolved for
    fn release(&self) -> &ReleaseId;

    /// Mangled name of a type, without loading it
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MappingNotFound`] if unmapped.
    fn mangled_type(&self, symbolic: &str) -> Result<String>;

    /// Check that a type is mapped
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MappingNotFound`] if unmapped.
    fn check_type(&self, symbolic: &str) -> Result<()> {
        self.mangled_type(symbolic).map(drop)
    }

    /// Check that a field and its owner are mapped
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MappingNotFound`] if unmapped.
    fn check_field(&self, owner: &str, name: &str) -> Result<()>;

    /// Check that a method, its owner and its parameter types are mapped
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MappingNotFound`] if unmapped.
    fn check_method(&self, owner: &str, name: &str, params: &[&str]) -> Result<()>;

    /// Load a type
    ///
    /// # Errors
    /// Returns the mapping, loading or patch failure for the type.
    fn type_of(&self, symbolic: &str) -> Result<TypeHandle>;

    /// Bind a field declared on `owner`
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MemberNotFound`] if the mapped field does
    /// not exist on the loaded type.
    fn field(&self, owner: &str, name: &str) -> Result<FieldHandle>;

    /// Bind a method declared on `owner`
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MemberNotFound`] if the mapped method
    /// does not exist on the loaded type with these parameter types.
    fn method(&self, owner: &str, name: &str, params: &[&str]) -> Result<MethodHandle>;

    /// Bind a field by its runtime name, bypassing the mapping
    ///
    /// Used for members the adapter itself injected.
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MemberNotFound`] if absent.
    fn injected_field(&self, owner: &str, name: &str) -> Result<FieldHandle>;
}

/// [`SymbolResolver`] backed by a [`SymbolMap`] and a [`TypeCache`]
pub struct MappedResolver {
    symbols: Arc<SymbolMap>,
    types: Arc<TypeCache>,
    runtime: Arc<dyn ForeignRuntime>,
}

impl MappedResolver {
    /// Create resolver
    #[must_use]
    pub fn new(
        symbols: Arc<SymbolMap>,
        types: Arc<TypeCache>,
        runtime: Arc<dyn ForeignRuntime>,
    ) -> Self {
        Self {
            symbols,
            types,
            runtime,
        }
    }

    /// Underlying type cache
    #[inline]
    #[must_use]
    pub fn types(&self) -> &Arc<TypeCache> {
        &self.types
    }

    fn not_found(&self, symbol: Symbol, mangled: &str) -> CompatibilityError {
        CompatibilityError::MemberNotFound {
            symbol,
            mangled: mangled.to_string(),
            release: self.symbols.release().clone(),
        }
    }
}

impl SymbolResolver for MappedResolver {
    fn release(&self) -> &ReleaseId {
        self.symbols.release()
    }

    fn mangled_type(&self, symbolic: &str) -> Result<String> {
        Ok(self.symbols.resolve_type(symbolic)?.to_string())
    }

    fn check_field(&self, owner: &str, name: &str) -> Result<()> {
        self.symbols.resolve_type(owner)?;
        self.symbols.resolve_field(owner, name)?;
        Ok(())
    }

    fn check_method(&self, owner: &str, name: &str, params: &[&str]) -> Result<()> {
        self.symbols.resolve_type(owner)?;
        for param in params {
            if *param != Primitive::Int.name() {
                self.symbols.resolve_type(param)?;
            }
        }
        self.symbols.resolve_method(owner, name, params)?;
        Ok(())
    }

    fn type_of(&self, symbolic: &str) -> Result<TypeHandle> {
        self.types.get(symbolic)
    }

    fn field(&self, owner: &str, name: &str) -> Result<FieldHandle> {
        let ty = self.types.get(owner)?;
        let mangled = self.symbols.resolve_field(owner, name)?;
        self.runtime
            .field(&ty, mangled)
            .ok_or_else(|| self.not_found(Symbol::field(owner, name), mangled))
    }

    fn method(&self, owner: &str, name: &str, params: &[&str]) -> Result<MethodHandle> {
        let ty = self.types.get(owner)?;
        let param_types = params
            .iter()
            .map(|p| self.types.get(p))
            .collect::<Result<Vec<_>>>()?;
        let mangled = self.symbols.resolve_method(owner, name, params)?;
        self.runtime
            .method(&ty, mangled, &param_types)
            .ok_or_else(|| self.not_found(Symbol::method(owner, name, params), mangled))
    }

    fn injected_field(&self, owner: &str, name: &str) -> Result<FieldHandle> {
        let ty = self.types.get(owner)?;
        self.runtime
            .field(&ty, name)
            .ok_or_else(|| self.not_found(Symbol::field(owner, name), &format!("{ty}.{name}")))
    }
}

impl std::fmt::Debug for MappedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedResolver")
            .field("release", self.symbols.release())
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}
