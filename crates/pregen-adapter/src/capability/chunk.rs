use super::names::{GET_CHUNK, INT, LEVEL};
use super::{Capability, CapabilityContext, Contract, Input, Output, Variant};
use crate::error::{CompatibilityError, Result};
use crate::runtime::{ForeignRuntime, MethodHandle, Value};
use std::sync::Arc;

/// `Level.getChunk(int, int)` on the dimension's level
#[derive(Debug, Default)]
pub struct GenerateChunkVariant;

impl GenerateChunkVariant {
    fn get_chunk(ctx: &CapabilityContext<'_>) -> Result<MethodHandle> {
        ctx.resolver().method(LEVEL, GET_CHUNK, &[INT, INT])
    }
}

impl Variant for GenerateChunkVariant {
    fn check_mappings(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        ctx.resolver().check_method(LEVEL, GET_CHUNK, &[INT, INT])
    }

    fn check_structure(&self, ctx: &CapabilityContext<'_>) -> Result<()> {
        Self::get_chunk(ctx).map(drop)
    }

    fn bind(self: Box<Self>, ctx: &CapabilityContext<'_>) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(GenerateChunk {
            get_chunk: Self::get_chunk(ctx)?,
            level: ctx.capability(Contract::Level)?,
            runtime: ctx.runtime(),
        }))
    }
}

struct GenerateChunk {
    get_chunk: MethodHandle,
    level: Arc<dyn Capability>,
    runtime: Arc<dyn ForeignRuntime>,
}

impl Capability for GenerateChunk {
    fn contract(&self) -> Contract {
        Contract::GenerateChunk
    }

    fn invoke(&self, input: &Input) -> Result<Output> {
        let Input::Chunk { dimension, x, z } = *input else {
            return Err(CompatibilityError::ContractViolation {
                contract: Contract::GenerateChunk,
                expected: "chunk",
                actual: input.kind().to_string(),
            });
        };
        let level = self
            .level
            .invoke(&Input::Dimension(dimension))?
            .into_object(Contract::Level)?;
        self.runtime
            .invoke(&self.get_chunk, Some(level), &[Value::Int(x), Value::Int(z)])
            .map_err(|e| CompatibilityError::runtime(&self.get_chunk, e))?;
        Ok(Output::Unit)
    }
}
