//! Capability registry and version selection
//!
//! Variants are registered per contract under the first release they
//! support. Selection picks, for the running release `R`, the variant with
//! the greatest minimum release `V <= R` in catalog order.

use crate::capability::builtin::builtin_variants;
use crate::capability::{Contract, Variant};
use crate::error::{CompatibilityError, Result};
use pregen_symbol::{ReleaseId, ReleaseOrder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Builder = Arc<dyn Fn() -> Box<dyn Variant> + Send + Sync>;

/// Registration of one variant
#[derive(Clone)]
pub struct VariantSpec {
    contract: Contract,
    since: ReleaseId,
    name: &'static str,
    build: Builder,
}

impl VariantSpec {
    /// Create registration
    pub fn new<F>(contract: Contract, since: impl Into<ReleaseId>, name: &'static str, build: F) -> Self
    where
        F: Fn() -> Box<dyn Variant> + Send + Sync + 'static,
    {
        Self {
            contract,
            since: since.into(),
            name,
            build: Arc::new(build),
        }
    }

    /// Contract implemented
    #[inline]
    #[must_use]
    pub fn contract(&self) -> Contract {
        self.contract
    }

    /// First supported release
    #[inline]
    #[must_use]
    pub fn since(&self) -> &ReleaseId {
        &self.since
    }

    /// Short variant name for diagnostics
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a fresh, unvalidated variant
    #[must_use]
    pub fn build(&self) -> Box<dyn Variant> {
        (self.build)()
    }
}

impl fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantSpec")
            .field("contract", &self.contract)
            .field("since", &self.since)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How to handle releases older than every registered variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Fall back to the oldest variant instead of failing
    pub best_effort: bool,
}

impl SelectionPolicy {
    /// Strict selection
    pub const STRICT: Self = Self { best_effort: false };
    /// Best-effort selection
    pub const BEST_EFFORT: Self = Self { best_effort: true };
}

/// Oldest releases the adapter accepts
///
/// A release is supported if it is one of the exact releases or not older
/// than `since` in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportFloor {
    exact: Vec<ReleaseId>,
    since: ReleaseId,
}

impl SupportFloor {
    /// Floor at `since`, plus individually supported older releases
    pub fn new<I, S>(since: impl Into<ReleaseId>, exact: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ReleaseId>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            since: since.into(),
        }
    }

    /// 1.14.4, and every release from 19w36a on
    #[must_use]
    pub fn builtin() -> Self {
        Self::new("19w36a", ["1.14.4"])
    }

    /// Oldest release accepted after the exact ones
    #[inline]
    #[must_use]
    pub fn since(&self) -> &ReleaseId {
        &self.since
    }

    /// Check `release` against the floor
    ///
    /// Under a best-effort policy a release below the floor is accepted with
    /// a warning.
    ///
    /// # Errors
    /// - [`CompatibilityError::Catalog`] if `release` or the floor is unknown
    ///   to `order`
    /// - [`CompatibilityError::BelowSupportFloor`] if `release` is older than
    ///   the floor and `policy` is strict
    pub fn check(&self, release: &ReleaseId, order: &dyn ReleaseOrder, policy: SelectionPolicy) -> Result<()> {
        if self.exact.contains(release) || order.compare(&self.since, release)?.is_le() {
            return Ok(());
        }
        if policy.best_effort {
            tracing::warn!(%release, floor = %self.since, "release predates the oldest supported release");
            return Ok(());
        }
        Err(CompatibilityError::BelowSupportFloor {
            release: release.clone(),
            floor: self.since.clone(),
        })
    }
}

impl Default for SupportFloor {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Same contract registered twice for the same release
    #[error("{contract} already has a variant registered since {since}")]
    Duplicate {
        /// Contract
        contract: Contract,
        /// Minimum release
        since: ReleaseId,
    },
}

/// Variants per contract
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    variants: HashMap<Contract, Vec<VariantSpec>>,
}

impl CapabilityRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in variant
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the built-in list is
    /// inconsistent.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in builtin_variants() {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Register a variant
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the contract already has a
    /// variant for the same minimum release.
    pub fn register(&mut self, spec: VariantSpec) -> Result<(), RegistryError> {
        let entries = self.variants.entry(spec.contract).or_default();
        if entries.iter().any(|existing| existing.since == spec.since) {
            return Err(RegistryError::Duplicate {
                contract: spec.contract,
                since: spec.since,
            });
        }
        entries.push(spec);
        Ok(())
    }

    /// Variants registered for a contract, in registration order
    #[must_use]
    pub fn variants(&self, contract: Contract) -> &[VariantSpec] {
        self.variants.get(&contract).map_or(&[], Vec::as_slice)
    }

    /// Total number of registered variants
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.values().map(Vec::len).sum()
    }

    /// Check if no variant is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select the variant of `contract` for `release`
    ///
    /// # Errors
    /// - [`CompatibilityError::Catalog`] if a release is unknown to `order`
    /// - [`CompatibilityError::UnsupportedRelease`] if no variant covers
    ///   `release` and `policy` is strict
    pub fn select(
        &self,
        contract: Contract,
        release: &ReleaseId,
        order: &dyn ReleaseOrder,
        policy: SelectionPolicy,
    ) -> Result<&VariantSpec> {
        let mut best: Option<&VariantSpec> = None;
        let mut oldest: Option<&VariantSpec> = None;

        for spec in self.variants(contract) {
            if order.compare(&spec.since, release)? != Ordering::Greater {
                let newer = match best {
                    Some(current) => order.compare(&spec.since, &current.since)?.is_gt(),
                    None => true,
                };
                if newer {
                    best = Some(spec);
                }
            }
            let older = match oldest {
                Some(current) => order.compare(&spec.since, &current.since)?.is_lt(),
                None => true,
            };
            if older {
                oldest = Some(spec);
            }
        }

        match (best, oldest) {
            (Some(spec), _) => Ok(spec),
            (None, Some(spec)) if policy.best_effort => {
                tracing::warn!(
                    %contract,
                    %release,
                    variant = spec.name(),
                    since = %spec.since(),
                    "release predates every variant, using the oldest"
                );
                Ok(spec)
            }
            _ => Err(CompatibilityError::UnsupportedRelease {
                contract,
                release: release.clone(),
            }),
        }
    }
}
