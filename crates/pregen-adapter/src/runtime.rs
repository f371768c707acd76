//! Foreign runtime seam
//!
//! The target application runs inside a managed runtime the adapter does not
//! own. [`ForeignRuntime`] is the single platform seam: it defines types from
//! their binary form, looks members up by mangled name and performs reads
//! and calls. Everything above this module works with the typed handles
//! defined here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Loaded type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    id: u64,
    name: Arc<str>,
}

impl TypeHandle {
    /// Create handle for runtime-assigned id and runtime name
    #[inline]
    #[must_use]
    pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Runtime-assigned id
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runtime (mangled) type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Bound field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldHandle {
    id: u64,
    owner: TypeHandle,
    name: Arc<str>,
    is_static: bool,
}

impl FieldHandle {
    /// Create field handle
    #[inline]
    #[must_use]
    pub fn new(id: u64, owner: TypeHandle, name: impl Into<Arc<str>>, is_static: bool) -> Self {
        Self {
            id,
            owner,
            name: name.into(),
            is_static,
        }
    }

    /// Runtime-assigned id
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Declaring type
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &TypeHandle {
        &self.owner
    }

    /// Runtime field name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field belongs to the type rather than an instance
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Bound method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    id: u64,
    owner: TypeHandle,
    name: Arc<str>,
    params: Arc<[TypeHandle]>,
}

impl MethodHandle {
    /// Create method handle
    #[inline]
    #[must_use]
    pub fn new(
        id: u64,
        owner: TypeHandle,
        name: impl Into<Arc<str>>,
        params: impl Into<Arc<[TypeHandle]>>,
    ) -> Self {
        Self {
            id,
            owner,
            name: name.into(),
            params: params.into(),
        }
    }

    /// Runtime-assigned id
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Declaring type
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &TypeHandle {
        &self.owner
    }

    /// Runtime method name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types in order
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[TypeHandle] {
        &self.params
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.owner, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(param.name())?;
        }
        f.write_str(")")
    }
}

/// Reference to a live object inside the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(u64);

impl ObjectRef {
    /// Wrap runtime object id
    #[inline]
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Runtime object id
    #[inline]
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Value crossing the runtime boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value (void call)
    Void,
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// String
    Str(String),
    /// String array (entry point arguments)
    StrArray(Vec<String>),
    /// Object reference
    Object(ObjectRef),
}

impl Value {
    /// Object reference, if this is one
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Boolean, if this is one
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short description of the variant for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Str(_) => "string",
            Self::StrArray(_) => "string[]",
            Self::Object(_) => "object",
        }
    }
}

/// Primitive types the runtime exposes without loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// 32-bit integer
    Int,
    /// Boolean
    Boolean,
}

impl Primitive {
    /// Source-level name
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Boolean => "boolean",
        }
    }
}

/// Runtime-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Binary form rejected by the runtime
    #[error("invalid type image for {name}: {reason}")]
    InvalidImage {
        /// Type being defined
        name: String,
        /// Rejection reason
        reason: String,
    },

    /// Type is already defined
    #[error("type {0} is already defined")]
    DuplicateType(String),

    /// Instance member used without a receiver
    #[error("{0} requires a receiver")]
    MissingReceiver(String),

    /// Call or read raised inside the runtime
    #[error("{member} raised: {message}")]
    Raised {
        /// Member that raised
        member: String,
        /// Runtime message
        message: String,
    },
}

/// The managed runtime hosting the target
pub trait ForeignRuntime: Send + Sync {
    /// Handle for a primitive type
    fn primitive(&self, primitive: Primitive) -> TypeHandle;

    /// Platform type visible to every loader (`java.lang.String`, ...)
    fn system_type(&self, name: &str) -> Option<TypeHandle>;

    /// Define a type from its binary form
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the runtime rejects the image.
    fn define_type(&self, name: &str, image: &[u8]) -> Result<TypeHandle, RuntimeError>;

    /// Field declared on `owner` by runtime name
    fn field(&self, owner: &TypeHandle, name: &str) -> Option<FieldHandle>;

    /// Method on `owner` by runtime name and exact parameter types
    fn method(&self, owner: &TypeHandle, name: &str, params: &[TypeHandle])
        -> Option<MethodHandle>;

    /// Static entry method of `ty`, if it declares one
    fn entry_method(&self, ty: &TypeHandle) -> Option<MethodHandle>;

    /// Read a field; `target` is `None` for static fields
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the read fails inside the runtime.
    fn read_field(&self, field: &FieldHandle, target: Option<ObjectRef>)
        -> Result<Value, RuntimeError>;

    /// Call a method; `target` is `None` for static methods
    ///
    /// # Errors
    /// Returns [`RuntimeError`] if the call raises.
    fn invoke(
        &self,
        method: &MethodHandle,
        target: Option<ObjectRef>,
        args: &[Value],
    ) -> Result<Value, RuntimeError>;

    /// Whether a runtime thread with this name is alive
    fn thread_alive(&self, name: &str) -> bool;

    /// Wait for a named runtime thread to finish; `true` if it did in time
    fn join_thread(&self, name: &str, timeout: Duration) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_handle_display_lists_params() {
        let owner = TypeHandle::new(1, "bhr");
        let int = TypeHandle::new(0, "int");
        let method = MethodHandle::new(2, owner, "a", vec![int.clone(), int]);
        assert_eq!(method.to_string(), "bhr.a(int,int)");
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Object(ObjectRef::new(7)).as_object(), Some(ObjectRef::new(7)));
        assert_eq!(Value::Null.as_object(), None);
        assert_eq!(Value::Int(3).kind(), "int");
    }
}
