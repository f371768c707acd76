//! Server-level capabilities

use super::names::{DEDICATED_SERVER, IS_READY, MINECRAFT_SERVER};
use super::{Capability, CapabilityContext, Contract, Input, Output, TargetHost, Variant};
use crate::error::{CompatibilityError, Result};
use crate::patch::INSTANCE_FIELD;
use crate::runtime::{FieldHandle, ForeignRuntime, Value};
use crate::slot::InstanceSlot;
use pregen_symbol::Symbol;
use std::sync::Arc;

/// Mangled name of `DedicatedServer`
///
/// Runs before the type is designated for patching, so it never loads it.
#[derive(Debug, Default)]
pub struct ServerTypeNameVariant;

impl Variant for ServerTypeNameVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        ctx.resolver().check_type(DEDICATED_SERVER)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(ServerTypeName {
            name: ctx.resolver().mangled_type(DEDICATED_SERVER)?,
        }))
    }
}

struct ServerTypeName {
    name: String,
}

impl Capability for ServerTypeName {
    fn contract(&self) -> Contract {
        Contract::ServerTypeName
    }

    fn invoke(&self, _input: &Input) -> Result<Output> {
        Ok(Output::Name(self.name.clone()))
    }
}

/// Server instance read from the injected static field
#[derive(Debug, Default)]
pub struct ServerInstanceVariant;

impl ServerInstanceVariant {
    fn instance_field(ctx: &CapabilityContext<'_>) -> Result<FieldHandle> {
        let field = ctx.resolver().injected_field(DEDICATED_SERVER, INSTANCE_FIELD)?;
        if field.is_static() {
            Ok(field)
        } else {
            Err(CompatibilityError::MemberNotFound {
                symbol: Symbol::field(DEDICATED_SERVER, INSTANCE_FIELD),
                mangled: format!("static {field}"),
                release: ctx.release().clone(),
            })
        }
    }
}

impl Variant for ServerInstanceVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        ctx.resolver().check_type(DEDICATED_SERVER)
    }

    fn check_structure(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        Self::instance_field(ctx).map(drop)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        let slot = ctx.slot();
        if !slot.bind(Self::instance_field(ctx)?) {
            tracing::debug!("instance slot already bound");
        }
        Ok(Arc::new(ServerInstance {
            slot,
            runtime: ctx.runtime(),
            host: ctx.host(),
        }))
    }
}

struct ServerInstance {
    slot: Arc<InstanceSlot>,
    runtime: Arc<dyn ForeignRuntime>,
    host: Arc<dyn TargetHost>,
}

impl Capability for ServerInstance {
    fn contract(&self) -> Contract {
        Contract::ServerInstance
    }

    fn invoke(&self, _input: &Input) -> Result<Output> {
        if !self.host.is_alive() {
            return Err(CompatibilityError::TargetUnavailable(
                "server thread is not running".into(),
            ));
        }
        let server = self.slot.current(self.runtime.as_ref())?;
        Ok(Output::Value(Value::Object(server)))
    }
}

/// `MinecraftServer.isReady` on the current instance
#[derive(Debug, Default)]
pub struct IsReadyVariant;

impl Variant for IsReadyVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        ctx.resolver().check_field(MINECRAFT_SERVER, IS_READY)
    }

    fn check_structure(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        ctx.resolver().field(MINECRAFT_SERVER, IS_READY).map(drop)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(IsReady {
            field: ctx.resolver().field(MINECRAFT_SERVER, IS_READY)?,
            server: ctx.capability(Contract::ServerInstance)?,
            runtime: ctx.runtime(),
        }))
    }
}

struct IsReady {
    field: FieldHandle,
    server: Arc<dyn Capability>,
    runtime: Arc<dyn ForeignRuntime>,
}

impl Capability for IsReady {
    fn contract(&self) -> Contract {
        Contract::IsReady
    }

    fn invoke(&self, _input: &Input) -> Result<Output> {
        let server = self
            .server
            .invoke(&Input::None)?
            .into_object(Contract::ServerInstance)?;
        match self
            .runtime
            .read_field(&self.field, Some(server))
            .map_err(|e| CompatibilityError::runtime(&self.field, e))?
        {
            Value::Bool(ready) => Ok(Output::Bool(ready)),
            other => Err(CompatibilityError::ContractViolation {
                contract: Contract::IsReady,
                expected: "boolean field",
                actual: other.kind().to_string(),
            }),
        }
    }
}
