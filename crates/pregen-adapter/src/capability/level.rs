//! Dimension and level capabilities

use super::names::{GET_LEVEL, MINECRAFT_SERVER};
use super::{Capability, CapabilityContext, Contract, Input, Output, Variant};
use crate::dimension::Dimension;
use crate::error::{CompatibilityError, Result};
use crate::runtime::{FieldHandle, ForeignRuntime, MethodHandle, ObjectRef, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// How a dimension maps to the symbolic name of its static field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionRule {
    /// `END` is spelled `THE_END`
    TheEnd,
    /// `<DIMENSION>_LOCATION`
    LocationSuffix,
    /// Dimension name unchanged
    Identity,
}

impl DimensionRule {
    /// Symbolic field name for `dimension`
    #[must_use]
    pub fn apply(self, dimension: Dimension) -> String {
        match (self, dimension) {
            (Self::TheEnd, Dimension::End) => "THE_END".to_string(),
            (Self::LocationSuffix, d) => format!("{d}_LOCATION"),
            (_, d) => d.as_str().to_string(),
        }
    }
}

/// Maps dimensions to field names; needs nothing from the target
#[derive(Debug, Clone, Copy)]
pub struct DimensionFieldVariant {
    rule: DimensionRule,
}

impl DimensionFieldVariant {
    /// Create variant applying `rule`
    #[inline]
    #[must_use]
    pub fn new(rule: DimensionRule) -> Self {
        Self { rule }
    }
}

impl Variant for DimensionFieldVariant {
    fn check_mappings(&self, _ctx: &CapabilityContext<'_>) -> Result<()> {
        Ok(())
    }

    fn bind(self: Box<Self>, _ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(DimensionField { rule: self.rule }))
    }
}

struct DimensionField {
    rule: DimensionRule,
}

impl Capability for DimensionField {
    fn contract(&self) -> Contract {
        Contract::DimensionField
    }

    fn invoke(&self, input: &Input) -> Result<Output> {
        let dimension = input.dimension(Contract::DimensionField)?;
        Ok(Output::Name(self.rule.apply(dimension)))
    }
}

/// Level key read from a static field per dimension on `owner`
///
/// All three dimensions are validated, whichever the run generates.
#[derive(Debug, Clone, Copy)]
pub struct LevelKeyVariant {
    owner: &'static str,
    requires: &'static [&'static str],
}

impl LevelKeyVariant {
    /// Create variant reading static fields of `owner`; `requires` lists
    /// further types that must be present
    #[inline]
    #[must_use]
    pub fn new(owner: &'static str, requires: &'static [&'static str]) -> Self {
        Self { owner, requires }
    }

    fn field_names(ctx: &CapabilityContext<'_>) -> Result<Vec<String>> {
        Dimension::ALL
            .into_iter()
            .map(|d| {
                ctx.invoke(Contract::DimensionField, &Input::Dimension(d))?
                    .into_name(Contract::DimensionField)
            })
            .collect()
    }

    fn bind_fields(&self, ctx: &CapabilityContext<'_>) -> Result<Vec<FieldHandle>> {
        Self::field_names(ctx)?
            .iter()
            .map(|name| ctx.resolver().field(self.owner, name))
            .collect()
    }
}

impl Variant for LevelKeyVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        let resolver = ctx.resolver();
        resolver.check_type(self.owner)?;
        for ty in self.requires {
            resolver.check_type(ty)?;
        }
        for name in Self::field_names(ctx)? {
            resolver.check_field(self.owner, &name)?;
        }
        Ok(())
    }

    fn check_structure(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        for ty in self.requires {
            ctx.resolver().type_of(ty)?;
        }
        self.bind_fields(ctx).map(drop)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(LevelKey {
            fields: self.bind_fields(ctx)?,
            runtime: ctx.runtime(),
        }))
    }
}

struct LevelKey {
    fields: Vec<FieldHandle>,
    runtime: Arc<dyn ForeignRuntime>,
}

impl Capability for LevelKey {
    fn contract(&self) -> Contract {
        Contract::LevelKey
    }

    fn invoke(&self, input: &Input) -> Result<Output> {
        let dimension = input.dimension(Contract::LevelKey)?;
        let field = &self.fields[dimension.index()];
        let key = self
            .runtime
            .read_field(field, None)
            .map_err(|e| CompatibilityError::runtime(field, e))?;
        Ok(Output::Value(key))
    }
}

/// `MinecraftServer.getLevel(<key type>)`, cached per dimension
#[derive(Debug, Clone, Copy)]
pub struct LevelVariant {
    key_type: &'static str,
    requires: &'static [&'static str],
}

impl LevelVariant {
    /// Create variant calling `getLevel` with a `key_type` argument;
    /// `requires` lists further types that must be present
    #[inline]
    #[must_use]
    pub fn new(key_type: &'static str, requires: &'static [&'static str]) -> Self {
        Self { key_type, requires }
    }

    fn get_level(&self, ctx: &CapabilityContext<'_>) -> Result<MethodHandle> {
        ctx.resolver()
            .method(MINECRAFT_SERVER, GET_LEVEL, &[self.key_type])
    }
}

impl Variant for LevelVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        let resolver = ctx.resolver();
        for ty in self.requires {
            resolver.check_type(ty)?;
        }
        resolver.check_method(MINECRAFT_SERVER, GET_LEVEL, &[self.key_type])
    }

    fn check_structure(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        for ty in self.requires {
            ctx.resolver().type_of(ty)?;
        }
        self.get_level(ctx).map(drop)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(Level {
            get_level: self.get_level(ctx)?,
            server: ctx.capability(Contract::ServerInstance)?,
            key: ctx.capability(Contract::LevelKey)?,
            runtime: ctx.runtime(),
            cache: Mutex::new([None; 3]),
        }))
    }
}

struct Level {
    get_level: MethodHandle,
    server: Arc<dyn Capability>,
    key: Arc<dyn Capability>,
    runtime: Arc<dyn ForeignRuntime>,
    cache: Mutex<[Option<ObjectRef>; 3]>,
}

impl Capability for Level {
    fn contract(&self) -> Contract {
        Contract::Level
    }

    fn invoke(&self, input: &Input) -> Result<Output> {
        let dimension = input.dimension(Contract::Level)?;
        if let Some(level) = self.cache.lock()[dimension.index()] {
            return Ok(Output::Value(Value::Object(level)));
        }

        let server = self
            .server
            .invoke(&Input::None)?
            .into_object(Contract::ServerInstance)?;
        let key = self
            .key
            .invoke(&Input::Dimension(dimension))?
            .into_value(Contract::LevelKey)?;
        let level = self
            .runtime
            .invoke(&self.get_level, Some(server), &[key])
            .map_err(|e| CompatibilityError::runtime(&self.get_level, e))?;
        let Value::Object(level) = level else {
            return Err(CompatibilityError::TargetUnavailable(format!(
                "server did not load level {dimension}"
            )));
        };
        self.cache.lock()[dimension.index()] = Some(level);
        tracing::debug!(%dimension, "resolved level");
        Ok(Output::Value(Value::Object(level)))
    }
}
