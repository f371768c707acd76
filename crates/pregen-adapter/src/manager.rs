//! Capability manager
//!
//! Owns one lazily created, validated capability per contract. Each contract
//! has its own once-cell, so a capability may instantiate another one while
//! it is itself being validated.

use crate::capability::{Capability, CapabilityContext, Contract, Input, Output, TargetHost};
use crate::dimension::Dimension;
use crate::error::Result;
use crate::registry::{CapabilityRegistry, SelectionPolicy};
use crate::resolver::SymbolResolver;
use crate::runtime::{ForeignRuntime, ObjectRef, Value};
use crate::slot::InstanceSlot;
use once_cell::sync::OnceCell;
use pregen_symbol::{ReleaseId, ReleaseOrder};
use std::sync::Arc;

/// Operations the driver performs against the running target
pub trait TargetOps: Send + Sync {
    /// Whether the target finished starting
    ///
    /// # Errors
    /// Returns the capability failure.
    fn is_ready(&self) -> Result<bool>;

    /// Materialize the chunk at `(x, z)` in `dimension`
    ///
    /// # Errors
    /// Returns the capability failure.
    fn generate_chunk(&self, dimension: Dimension, x: i32, z: i32) -> Result<()>;
}

/// Instantiates, validates and caches capabilities for one release
pub struct CapabilityManager {
    release: ReleaseId,
    registry: CapabilityRegistry,
    order: Arc<dyn ReleaseOrder>,
    resolver: Arc<dyn SymbolResolver>,
    runtime: Arc<dyn ForeignRuntime>,
    host: Arc<dyn TargetHost>,
    slot: Arc<InstanceSlot>,
    policy: SelectionPolicy,
    instances: [OnceCell<Arc<dyn Capability>>; Contract::COUNT],
}

impl CapabilityManager {
    /// Create manager with strict selection
    #[must_use]
    pub fn new(
        release: ReleaseId,
        registry: CapabilityRegistry,
        order: Arc<dyn ReleaseOrder>,
        resolver: Arc<dyn SymbolResolver>,
        runtime: Arc<dyn ForeignRuntime>,
        host: Arc<dyn TargetHost>,
    ) -> Self {
        Self {
            release,
            registry,
            order,
            resolver,
            runtime,
            host,
            slot: Arc::new(InstanceSlot::new()),
            policy: SelectionPolicy::STRICT,
            instances: std::array::from_fn(|_| OnceCell::new()),
        }
    }

    /// Set selection policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Running release
    #[inline]
    #[must_use]
    pub fn release(&self) -> &ReleaseId {
        &self.release
    }

    /// Name resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &dyn SymbolResolver {
        self.resolver.as_ref()
    }

    /// Runtime hosting the target
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    /// Target liveness
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn TargetHost> {
        &self.host
    }

    /// Slot holding the injected server back-reference
    #[inline]
    #[must_use]
    pub fn instance_slot(&self) -> &Arc<InstanceSlot> {
        &self.slot
    }

    /// Whether a contract's capability has been created
    #[inline]
    #[must_use]
    pub fn is_instantiated(&self, contract: Contract) -> bool {
        self.instances[contract.index()].get().is_some()
    }

    /// Capability for a contract, created and validated on first use
    ///
    /// # Errors
    /// Returns the selection, mapping, structural or binding failure. A
    /// failed contract is retried on the next call; callers treat every
    /// failure as fatal.
    pub fn instance(&self, contract: Contract) -> Result<Arc<dyn Capability>> {
        self.instances[contract.index()]
            .get_or_try_init(|| self.create(contract))
            .map(Arc::clone)
    }

    fn create(&self, contract: Contract) -> Result<Arc<dyn Capability>> {
        let spec = self
            .registry
            .select(contract, &self.release, self.order.as_ref(), self.policy)?;
        tracing::debug!(
            %contract,
            variant = spec.name(),
            since = %spec.since(),
            release = %self.release,
            "selected variant"
        );

        let variant = spec.build();
        let ctx = CapabilityContext::new(self);
        variant.check_mappings(&ctx)?;
        variant.check_structure(&ctx)?;
        let capability = variant.bind(&ctx)?;
        tracing::debug!(%contract, "capability ready");
        Ok(capability)
    }

    /// Invoke a contract through the generic bridge
    ///
    /// # Errors
    /// Returns the capability's failure.
    pub fn invoke(&self, contract: Contract, input: &Input) -> Result<Output> {
        self.instance(contract)?.invoke(input)
    }

    /// Instantiate and validate every contract in declaration order
    ///
    /// Stops at the first failure; later contracts are not attempted.
    ///
    /// # Errors
    /// Returns the first failure.
    pub fn validate_all(&self) -> Result<()> {
        for contract in Contract::ALL {
            self.instance(contract)?;
        }
        tracing::info!(release = %self.release, "all capabilities validated");
        Ok(())
    }

    /// Mangled name of the type to patch
    ///
    /// # Errors
    /// Returns the capability failure.
    pub fn server_type_name(&self) -> Result<String> {
        self.invoke(Contract::ServerTypeName, &Input::None)?
            .into_name(Contract::ServerTypeName)
    }

    /// Current server instance
    ///
    /// # Errors
    /// Returns [`crate::CompatibilityError::TargetUnavailable`] before the
    /// server is constructed.
    pub fn server_instance(&self) -> Result<ObjectRef> {
        self.invoke(Contract::ServerInstance, &Input::None)?
            .into_object(Contract::ServerInstance)
    }

    /// Symbolic field name for a dimension
    ///
    /// # Errors
    /// Returns the capability failure.
    pub fn dimension_field(&self, dimension: Dimension) -> Result<String> {
        self.invoke(Contract::DimensionField, &Input::Dimension(dimension))?
            .into_name(Contract::DimensionField)
    }

    /// Level key for a dimension
    ///
    /// # Errors
    /// Returns the capability failure.
    pub fn level_key(&self, dimension: Dimension) -> Result<Value> {
        self.invoke(Contract::LevelKey, &Input::Dimension(dimension))?
            .into_value(Contract::LevelKey)
    }

    /// Level object for a dimension
    ///
    /// # Errors
    /// Returns the capability failure.
    pub fn level(&self, dimension: Dimension) -> Result<ObjectRef> {
        self.invoke(Contract::Level, &Input::Dimension(dimension))?
            .into_object(Contract::Level)
    }
}

impl TargetOps for CapabilityManager {
    fn is_ready(&self) -> Result<bool> {
        self.invoke(Contract::IsReady, &Input::None)?
            .into_bool(Contract::IsReady)
    }

    fn generate_chunk(&self, dimension: Dimension, x: i32, z: i32) -> Result<()> {
        self.invoke(Contract::GenerateChunk, &Input::Chunk { dimension, x, z })?
            .into_unit(Contract::GenerateChunk)
    }
}

impl std::fmt::Debug for CapabilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready: Vec<_> = Contract::ALL
            .into_iter()
            .filter(|c| self.is_instantiated(*c))
            .collect();
        f.debug_struct("CapabilityManager")
            .field("release", &self.release)
            .field("policy", &self.policy)
            .field("instantiated", &ready)
            .finish_non_exhaustive()
    }
}
