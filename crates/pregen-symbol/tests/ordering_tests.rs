use pregen_symbol::{CatalogOrder, ReleaseCatalog, ReleaseId, ReleaseOrder, ReleaseRecord, SymbolMap};
use proptest::prelude::*;
use std::cmp::Ordering;

#[test]
fn test_catalog_three_releases() {
    let catalog = ReleaseCatalog::chronological(["a", "b", "c"]);
    let a = ReleaseId::new("a");
    let b = ReleaseId::new("b");
    let c = ReleaseId::new("c");

    assert_eq!(catalog.compare(&a, &b).unwrap(), Ordering::Less);
    assert_eq!(catalog.compare(&c, &a).unwrap(), Ordering::Greater);
    assert_eq!(catalog.compare(&b, &b).unwrap(), Ordering::Equal);
}

#[test]
fn test_symbol_map_exact_lookup() {
    let text = "\
net.minecraft.server.dedicated.DedicatedServer -> dg:
net.minecraft.world.level.dimension.DimensionType -> byn:
    net.minecraft.world.level.dimension.DimensionType OVERWORLD -> a
    net.minecraft.world.level.dimension.DimensionType NETHER -> b
    net.minecraft.world.level.dimension.DimensionType THE_END -> c
";
    let map = SymbolMap::parse_str(ReleaseId::new("1.14.4"), text);
    let dim = "net.minecraft.world.level.dimension.DimensionType";
    assert_eq!(map.resolve_type("net.minecraft.server.dedicated.DedicatedServer").unwrap(), "dg");
    assert_eq!(map.resolve_field(dim, "THE_END").unwrap(), "c");
    assert!(map.resolve_field(dim, "END").is_err());
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("r{i}")).collect()
}

proptest! {
    #[test]
    fn prop_compare_matches_position(n in 1usize..40, i in 0usize..40, j in 0usize..40) {
        let i = i % n;
        let j = j % n;
        let names = ids(n);
        let catalog = ReleaseCatalog::chronological(names.iter().map(String::as_str));
        let ord = catalog
            .compare(&ReleaseId::new(names[i].clone()), &ReleaseId::new(names[j].clone()))
            .unwrap();
        prop_assert_eq!(ord, i.cmp(&j));
    }

    #[test]
    fn prop_newest_first_is_reverse_of_chronological(n in 1usize..40, i in 0usize..40, j in 0usize..40) {
        let i = i % n;
        let j = j % n;
        let names = ids(n);
        let chronological = ReleaseCatalog::chronological(names.iter().map(String::as_str));
        let reversed: Vec<ReleaseRecord> = names
            .iter()
            .rev()
            .map(|s| ReleaseRecord::bare(s.as_str()))
            .collect();
        let newest_first = ReleaseCatalog::new(reversed, CatalogOrder::NewestFirst);
        let a = ReleaseId::new(names[i].clone());
        let b = ReleaseId::new(names[j].clone());
        prop_assert_eq!(
            chronological.compare(&a, &b).unwrap(),
            newest_first.compare(&a, &b).unwrap()
        );
    }
}
