//! Capabilities: version-specific implementations of fixed contracts
//!
//! A [`Variant`] is one implementation of one [`Contract`], valid from a
//! minimum release onward. The manager selects a variant for the running
//! release, runs its two validation phases and then binds it into a
//! [`Capability`] holding only typed handles.
//!
//! Validation happens in order:
//!
//! 1. [`Variant::check_mappings`]: every symbolic name it needs is mapped
//! 2. [`Variant::check_structure`]: every mapped name exists in the binary
//! 3. [`Variant::bind`]: members are bound into handles, once

pub mod builtin;
mod chunk;
mod level;
pub mod names;
mod server;

use crate::dimension::Dimension;
use crate::error::{CompatibilityError, Result};
use crate::manager::CapabilityManager;
use crate::resolver::SymbolResolver;
use crate::runtime::{ForeignRuntime, ObjectRef, Value};
use crate::slot::InstanceSlot;
use pregen_symbol::ReleaseId;
use std::fmt;
use std::sync::Arc;

pub use chunk::GenerateChunkVariant;
pub use level::{DimensionFieldVariant, DimensionRule, LevelKeyVariant, LevelVariant};
pub use server::{IsReadyVariant, ServerInstanceVariant, ServerTypeNameVariant};

/// Closed set of operations the driver needs from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Contract {
    /// `() -> name`: mangled name of the type to patch
    ServerTypeName,
    /// `() -> object`: the running server
    ServerInstance,
    /// `() -> bool`: server finished starting
    IsReady,
    /// `(dimension) -> name`: symbolic field naming the dimension
    DimensionField,
    /// `(dimension) -> value`: key identifying the dimension's level
    LevelKey,
    /// `(dimension) -> object`: the dimension's level
    Level,
    /// `(dimension, x, z) -> ()`: materialize one chunk
    GenerateChunk,
}

impl Contract {
    /// Number of contracts
    pub const COUNT: usize = 7;

    /// All contracts in declaration (validation) order
    pub const ALL: [Self; Self::COUNT] = [
        Self::ServerTypeName,
        Self::ServerInstance,
        Self::IsReady,
        Self::DimensionField,
        Self::LevelKey,
        Self::Level,
        Self::GenerateChunk,
    ];

    /// Position in [`Contract::ALL`]
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Contract name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerTypeName => "ServerTypeName",
            Self::ServerInstance => "ServerInstance",
            Self::IsReady => "IsReady",
            Self::DimensionField => "DimensionField",
            Self::LevelKey => "LevelKey",
            Self::Level => "Level",
            Self::GenerateChunk => "GenerateChunk",
        }
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// No argument
    None,
    /// One dimension
    Dimension(Dimension),
    /// Chunk coordinate within a dimension
    Chunk {
        /// Dimension
        dimension: Dimension,
        /// Chunk x
        x: i32,
        /// Chunk z
        z: i32,
    },
}

impl Input {
    /// Shape name for diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "no input",
            Self::Dimension(_) => "dimension",
            Self::Chunk { .. } => "chunk",
        }
    }

    /// Dimension argument
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn dimension(&self, contract: Contract) -> Result<Dimension> {
        match self {
            Self::Dimension(d) => Ok(*d),
            other => Err(violation(contract, "dimension", other.kind())),
        }
    }
}

/// Contract output
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Nothing
    Unit,
    /// Boolean
    Bool(bool),
    /// Name
    Name(String),
    /// Runtime value
    Value(Value),
}

impl Output {
    /// Shape name for diagnostics
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Unit => "unit".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Name(_) => "name".to_string(),
            Self::Value(v) => format!("value ({})", v.kind()),
        }
    }

    /// Unwrap a boolean
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn into_bool(self, contract: Contract) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(violation(contract, "bool", other.kind())),
        }
    }

    /// Unwrap a name
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn into_name(self, contract: Contract) -> Result<String> {
        match self {
            Self::Name(name) => Ok(name),
            other => Err(violation(contract, "name", other.kind())),
        }
    }

    /// Unwrap a runtime value
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn into_value(self, contract: Contract) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(violation(contract, "value", other.kind())),
        }
    }

    /// Unwrap an object reference
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn into_object(self, contract: Contract) -> Result<ObjectRef> {
        match self {
            Self::Value(Value::Object(obj)) => Ok(obj),
            other => Err(violation(contract, "object", other.kind())),
        }
    }

    /// Expect no output
    ///
    /// # Errors
    /// Returns [`CompatibilityError::ContractViolation`] for other shapes.
    pub fn into_unit(self, contract: Contract) -> Result<()> {
        match self {
            Self::Unit => Ok(()),
            other => Err(violation(contract, "unit", other.kind())),
        }
    }
}

fn violation(contract: Contract, expected: &'static str, actual: impl Into<String>) -> CompatibilityError {
    CompatibilityError::ContractViolation {
        contract,
        expected,
        actual: actual.into(),
    }
}

/// Liveness of the target process as seen by capabilities
pub trait TargetHost: Send + Sync {
    /// Whether the target's main thread is running
    fn is_alive(&self) -> bool;
}

/// Bound implementation of one contract
pub trait Capability: Send + Sync {
    /// Contract implemented
    fn contract(&self) -> Contract;

    /// Perform the operation
    ///
    /// # Errors
    /// Returns [`CompatibilityError`] if the target raises, is unavailable
    /// or the input has the wrong shape.
    fn invoke(&self, input: &Input) -> Result<Output>;
}

/// Unbound implementation of one contract for a range of releases
pub trait Variant {
    /// Verify that every symbolic name used is mapped
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MappingNotFound`] for the first missing
    /// name.
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()>;

    /// Verify that every mapped name exists in the loaded binary
    ///
    /// # Errors
    /// Returns [`CompatibilityError::MemberNotFound`] for the first missing
    /// member.
    fn check_structure(&self, _ctx: &CapabilityContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Bind members and collaborators into a ready capability
    ///
    /// # Errors
    /// Returns the binding failure.
    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>>;
}

/// Collaborators handed to a variant during validation and binding
pub struct CapabilityContext<'a> {
    manager: &'a CapabilityManager,
}

impl<'a> CapabilityContext<'a> {
    pub(crate) fn new(manager: &'a CapabilityManager) -> Self {
        Self { manager }
    }

    /// Running release
    #[inline]
    #[must_use]
    pub fn release(&self) -> &'a ReleaseId {
        self.manager.release()
    }

    /// Name resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &'a dyn SymbolResolver {
        self.manager.resolver()
    }

    /// Runtime hosting the target
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> Arc<dyn ForeignRuntime> {
        Arc::clone(self.manager.runtime())
    }

    /// Target liveness
    #[inline]
    #[must_use]
    pub fn host(&self) -> Arc<dyn TargetHost> {
        Arc::clone(self.manager.host())
    }

    /// Slot holding the injected server back-reference
    #[inline]
    #[must_use]
    pub fn slot(&self) -> Arc<InstanceSlot> {
        Arc::clone(self.manager.instance_slot())
    }

    /// Another capability, instantiated and validated on demand
    ///
    /// # Errors
    /// Returns the selection or validation failure of that capability.
    pub fn capability(&self, contract: Contract) -> Result<Arc<dyn Capability>> {
        self.manager.instance(contract)
    }

    /// Invoke another capability
    ///
    /// # Errors
    /// Returns that capability's failure.
    pub fn invoke(&self, contract: Contract, input: &Input) -> Result<Output> {
        self.manager.invoke(contract, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_index_matches_all() {
        for (i, contract) in Contract::ALL.into_iter().enumerate() {
            assert_eq!(contract.index(), i);
        }
    }

    #[test]
    fn output_shape_mismatch_is_contract_violation() {
        let err = Output::Unit.into_bool(Contract::IsReady).unwrap_err();
        assert_eq!(err.to_string(), "IsReady returned unit, expected bool");
        assert!(Output::Value(Value::Null).into_object(Contract::Level).is_err());
        assert_eq!(
            Output::Value(Value::Object(ObjectRef::new(3)))
                .into_object(Contract::Level)
                .unwrap(),
            ObjectRef::new(3)
        );
    }

    #[test]
    fn input_dimension() {
        assert_eq!(
            Input::Dimension(Dimension::End)
                .dimension(Contract::LevelKey)
                .unwrap(),
            Dimension::End
        );
        assert!(Input::None.dimension(Contract::LevelKey).is_err());
    }
}
