//! Offline compatibility check
//!
//! Answers "would this release work" without starting a target: the
//! release must be in the catalog and not below the support floor, every
//! contract must have a variant, and the type to patch must be mapped.

use pregen_adapter::capability::names::DEDICATED_SERVER;
use pregen_adapter::{
    CapabilityRegistry, CompatibilityError, Contract, SelectionPolicy, SupportFloor,
};
use pregen_symbol::{ReleaseId, ReleaseOrder, SymbolMap};
use std::fmt;

/// Variant chosen for one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Contract
    pub contract: Contract,
    /// Variant name
    pub variant: &'static str,
    /// Minimum release of the variant
    pub since: ReleaseId,
}

/// Result of [`check_compatibility`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityReport {
    /// Release checked
    pub release: ReleaseId,
    /// Types in the mapping
    pub mapped_types: usize,
    /// Mangled name of the type that would be patched
    pub server_type: String,
    /// One entry per contract, in validation order
    pub selections: Vec<Selection>,
}

impl fmt::Display for CompatibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Release: {}", self.release)?;
        writeln!(f, "Mapped types: {}", self.mapped_types)?;
        writeln!(f, "Patched type: {}", self.server_type)?;
        writeln!(f)?;
        for selection in &self.selections {
            writeln!(
                f,
                "  {:<16} {:<28} since {}",
                selection.contract.as_str(),
                selection.variant,
                selection.since
            )?;
        }
        Ok(())
    }
}

/// Select a built-in variant for every contract of the mapping's release
///
/// # Errors
/// Returns [`CompatibilityError::Catalog`] if the release is not in the
/// catalog, [`CompatibilityError::BelowSupportFloor`] if it is too old,
/// [`CompatibilityError::UnsupportedRelease`] if a contract has no
/// variant for it, or [`CompatibilityError::MappingNotFound`] if the type to
/// patch is not mapped.
pub fn check_compatibility(
    symbols: &SymbolMap,
    order: &dyn ReleaseOrder,
    policy: SelectionPolicy,
) -> Result<CompatibilityReport, CompatibilityError> {
    let release = symbols.release();
    order.compare(release, release)?;
    SupportFloor::builtin().check(release, order, policy)?;

    let registry = CapabilityRegistry::builtin()?;
    let selections = Contract::ALL
        .into_iter()
        .map(|contract| {
            let spec = registry.select(contract, release, order, policy)?;
            Ok(Selection {
                contract,
                variant: spec.name(),
                since: spec.since().clone(),
            })
        })
        .collect::<Result<Vec<_>, CompatibilityError>>()?;

    let server_type = symbols.resolve_type(DEDICATED_SERVER)?.to_string();

    Ok(CompatibilityReport {
        release: release.clone(),
        mapped_types: symbols.type_count(),
        server_type,
        selections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregen_symbol::ReleaseCatalog;

    const MAPPING: &str = "\
net.minecraft.server.dedicated.DedicatedServer -> abc:
net.minecraft.world.level.Level -> bhr:
";

    fn catalog() -> ReleaseCatalog {
        ReleaseCatalog::chronological(["1.14.4", "19w35a", "19w36a", "20w20b", "20w21a", "20w22a", "1.16"])
    }

    #[test]
    fn reports_every_contract() {
        let symbols = SymbolMap::parse_str(ReleaseId::new("1.16"), MAPPING);
        let report = check_compatibility(&symbols, &catalog(), SelectionPolicy::STRICT).unwrap();
        assert_eq!(report.server_type, "abc");
        assert_eq!(report.mapped_types, 2);
        assert_eq!(report.selections.len(), Contract::COUNT);
        let level_key = report
            .selections
            .iter()
            .find(|s| s.contract == Contract::LevelKey)
            .unwrap();
        assert_eq!(level_key.variant, "level-field");
        assert!(report.to_string().contains("Patched type: abc"));
    }

    #[test]
    fn unknown_release_is_catalog_error() {
        let symbols = SymbolMap::parse_str(ReleaseId::new("2.0"), MAPPING);
        let err = check_compatibility(&symbols, &catalog(), SelectionPolicy::STRICT).unwrap_err();
        assert!(matches!(err, CompatibilityError::Catalog(_)));
    }

    #[test]
    fn release_below_floor_is_rejected_unless_best_effort() {
        let symbols = SymbolMap::parse_str(ReleaseId::new("19w35a"), MAPPING);
        let err = check_compatibility(&symbols, &catalog(), SelectionPolicy::STRICT).unwrap_err();
        assert!(matches!(err, CompatibilityError::BelowSupportFloor { .. }));

        let report = check_compatibility(&symbols, &catalog(), SelectionPolicy::BEST_EFFORT).unwrap();
        assert_eq!(report.release.as_str(), "19w35a");
    }

    #[test]
    fn unmapped_server_type() {
        let symbols = SymbolMap::parse_str(ReleaseId::new("1.16"), "net.minecraft.world.level.Level -> bhr:\n");
        let err = check_compatibility(&symbols, &catalog(), SelectionPolicy::STRICT).unwrap_err();
        assert!(matches!(err, CompatibilityError::MappingNotFound(_)));
    }
}
