//! Built-in variant list

use super::names::{DIMENSION_TYPE, LEVEL, RESOURCE_KEY};
use super::{
    Contract, DimensionFieldVariant, DimensionRule, GenerateChunkVariant, IsReadyVariant,
    LevelKeyVariant, LevelVariant, ServerInstanceVariant, ServerTypeNameVariant,
};
use crate::registry::VariantSpec;

/// Every built-in variant with the first release it supports
#[must_use]
pub fn builtin_variants() -> Vec<VariantSpec> {
    vec![
        VariantSpec::new(Contract::ServerTypeName, "1.14.4", "dedicated-server-name", || {
            Box::new(ServerTypeNameVariant)
        }),
        VariantSpec::new(Contract::ServerInstance, "1.14.4", "injected-instance", || {
            Box::new(ServerInstanceVariant)
        }),
        VariantSpec::new(Contract::IsReady, "1.14.4", "is-ready-field", || {
            Box::new(IsReadyVariant)
        }),
        VariantSpec::new(Contract::DimensionField, "1.14.4", "the-end", || {
            Box::new(DimensionFieldVariant::new(DimensionRule::TheEnd))
        }),
        VariantSpec::new(Contract::DimensionField, "20w21a", "location-suffix", || {
            Box::new(DimensionFieldVariant::new(DimensionRule::LocationSuffix))
        }),
        VariantSpec::new(Contract::DimensionField, "20w22a", "identity", || {
            Box::new(DimensionFieldVariant::new(DimensionRule::Identity))
        }),
        VariantSpec::new(Contract::LevelKey, "1.14.4", "dimension-type-field", || {
            Box::new(LevelKeyVariant::new(DIMENSION_TYPE, &[]))
        }),
        VariantSpec::new(Contract::LevelKey, "20w20b", "dimension-type-field", || {
            Box::new(LevelKeyVariant::new(DIMENSION_TYPE, &[]))
        }),
        VariantSpec::new(Contract::LevelKey, "20w22a", "level-field", || {
            Box::new(LevelKeyVariant::new(LEVEL, &[RESOURCE_KEY]))
        }),
        VariantSpec::new(Contract::Level, "1.14.4", "get-level-by-dimension-type", || {
            Box::new(LevelVariant::new(DIMENSION_TYPE, &[DIMENSION_TYPE]))
        }),
        VariantSpec::new(Contract::Level, "20w21a", "get-level-by-resource-key", || {
            Box::new(LevelVariant::new(RESOURCE_KEY, &[RESOURCE_KEY]))
        }),
        VariantSpec::new(Contract::Level, "20w22a", "get-level-by-resource-key", || {
            Box::new(LevelVariant::new(RESOURCE_KEY, &[LEVEL, RESOURCE_KEY]))
        }),
        VariantSpec::new(Contract::GenerateChunk, "1.14.4", "level-get-chunk", || {
            Box::new(GenerateChunkVariant)
        }),
    ]
}
