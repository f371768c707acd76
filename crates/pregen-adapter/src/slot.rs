//! Access to the target's current server instance

use crate::error::{CompatibilityError, Result};
use crate::runtime::{FieldHandle, ForeignRuntime, ObjectRef, Value};
use once_cell::sync::OnceCell;

/// Reads the back-reference field injected by the structural patch
///
/// Owned by the capability manager. Bound once during setup of the
/// server-instance capability; reads are always fresh, so only the most
/// recently constructed instance is observed.
#[derive(Debug, Default)]
pub struct InstanceSlot {
    field: OnceCell<FieldHandle>,
}

impl InstanceSlot {
    /// Create unbound slot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the injected static field; `false` if already bound
    pub fn bind(&self, field: FieldHandle) -> bool {
        self.field.set(field).is_ok()
    }

    /// Whether the slot has been bound
    #[inline]
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.field.get().is_some()
    }

    /// Current server instance
    ///
    /// # Errors
    /// Returns [`CompatibilityError::TargetUnavailable`] if the slot is
    /// unbound or no instance has finished construction yet.
    pub fn current(&self, runtime: &dyn ForeignRuntime) -> Result<ObjectRef> {
        let field = self
            .field
            .get()
            .ok_or_else(|| CompatibilityError::TargetUnavailable("instance slot is not bound".into()))?;
        match runtime
            .read_field(field, None)
            .map_err(|e| CompatibilityError::runtime(field, e))?
        {
            Value::Object(obj) => Ok(obj),
            Value::Null => Err(CompatibilityError::TargetUnavailable(format!(
                "{field} is null: server not constructed yet"
            ))),
            other => Err(CompatibilityError::TargetUnavailable(format!(
                "{field} holds a {} instead of an object",
                other.kind()
            ))),
        }
    }
}
