//! Dependency-set diffing between two revisions of a composition.

use costgraph_units::UnitRegistry;

use crate::dependency::Dependency;

/// Partition of two dependency lists.
///
/// A dependency whose quantity changed shows up in both `removed` (old
/// variant) and `added` (new variant), never in `unchanged`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyDiff {
    /// Old entries with no equal counterpart, in old order.
    pub removed: Vec<Dependency>,
    /// Old entries (with their cached subvalue) matched by an equal new entry.
    pub unchanged: Vec<Dependency>,
    /// New entries with no equal counterpart, in new order.
    pub added: Vec<Dependency>,
}

impl DependencyDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    /// IDs of compositions that gained or lost an edge.
    pub fn touched_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .removed
            .iter()
            .chain(self.added.iter())
            .map(|dep| dep.of.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Classify `old` and `new` into removed, unchanged, and added.
///
/// Entries are paired by `of`; a new entry pairs with the first old entry of
/// the same `of` not already paired, so duplicate `of` values are handled
/// one-to-one. A pair is unchanged only when the quantities are equal after
/// normalization.
pub fn diff(old: &[Dependency], new: &[Dependency], registry: &UnitRegistry) -> DependencyDiff {
    let mut paired = vec![false; old.len()];
    let mut removed_idx = Vec::new();
    let mut result = DependencyDiff::default();

    for candidate in new {
        let partner = (0..old.len()).find(|&idx| !paired[idx] && old[idx].of == candidate.of);

        match partner {
            Some(idx) => {
                paired[idx] = true;
                if old[idx].quantity.equals(&candidate.quantity, registry) {
                    result.unchanged.push(old[idx].clone());
                } else {
                    removed_idx.push(idx);
                    result.added.push(candidate.clone());
                }
            }
            None => result.added.push(candidate.clone()),
        }
    }

    removed_idx.extend(
        paired
            .iter()
            .enumerate()
            .filter(|(_, matched)| !**matched)
            .map(|(idx, _)| idx),
    );
    removed_idx.sort_unstable();
    result.removed = removed_idx.into_iter().map(|idx| old[idx].clone()).collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgraph_units::Quantity;

    fn dep(of: &str, value: f64, unit: &str) -> Dependency {
        Dependency::new(of, Quantity::new(value, unit))
    }

    fn ofs(deps: &[Dependency]) -> Vec<&str> {
        deps.iter().map(|d| d.of.as_str()).collect()
    }

    #[test]
    fn identical_sets_are_all_unchanged() {
        let registry = UnitRegistry::standard();
        let old = vec![dep("a", 1.0, "kg"), dep("b", 2.0, "l")];
        let new = old.clone();

        let result = diff(&old, &new, &registry);
        assert!(result.removed.is_empty());
        assert!(result.added.is_empty());
        assert_eq!(ofs(&result.unchanged), vec!["a", "b"]);
        assert!(result.is_empty());
    }

    #[test]
    fn changed_quantity_is_removed_and_added() {
        let registry = UnitRegistry::standard();
        let old = vec![dep("a", 1.0, "kg"), dep("b", 2.0, "l")];
        let new = vec![dep("a", 1.0, "kg"), dep("b", 3.0, "l")];

        let result = diff(&old, &new, &registry);
        assert_eq!(ofs(&result.removed), vec!["b"]);
        assert_eq!(result.removed[0].quantity, Quantity::new(2.0, "l"));
        assert_eq!(ofs(&result.added), vec!["b"]);
        assert_eq!(result.added[0].quantity, Quantity::new(3.0, "l"));
        assert_eq!(ofs(&result.unchanged), vec!["a"]);
    }

    #[test]
    fn one_sided_entries_land_purely_in_removed_or_added() {
        let registry = UnitRegistry::standard();
        let old = vec![dep("a", 1.0, "kg"), dep("gone", 1.0, "u")];
        let new = vec![dep("fresh", 4.0, "m"), dep("a", 1.0, "kg")];

        let result = diff(&old, &new, &registry);
        assert_eq!(ofs(&result.removed), vec!["gone"]);
        assert_eq!(ofs(&result.added), vec!["fresh"]);
        assert_eq!(ofs(&result.unchanged), vec!["a"]);
        assert_eq!(result.touched_ids(), vec!["fresh", "gone"]);
    }

    #[test]
    fn equal_quantities_in_different_units_are_unchanged() {
        let registry = UnitRegistry::standard();
        let mut cached = dep("a", 0.5, "kg");
        cached.subvalue = 12.0;
        let result = diff(&[cached], &[dep("a", 500.0, "g")], &registry);
        assert_eq!(result.unchanged.len(), 1);
        assert_eq!(result.unchanged[0].subvalue, 12.0);
    }

    #[test]
    fn duplicate_of_values_pair_first_unmatched() {
        let registry = UnitRegistry::standard();
        let old = vec![dep("a", 1.0, "kg"), dep("a", 2.0, "kg")];
        let new = vec![dep("a", 2.0, "kg")];

        let result = diff(&old, &new, &registry);
        // new "a" pairs with old[0] (1 kg), which differs
        assert_eq!(result.removed.len(), 2);
        assert_eq!(result.added.len(), 1);
        assert!(result.unchanged.is_empty());
    }

    #[test]
    fn diff_is_order_independent() {
        let registry = UnitRegistry::standard();
        let old = vec![dep("a", 1.0, "kg"), dep("b", 1.0, "kg"), dep("c", 1.0, "kg")];
        let new = vec![dep("c", 1.0, "kg"), dep("a", 2.0, "kg"), dep("b", 1.0, "kg")];

        let result = diff(&old, &new, &registry);
        assert_eq!(ofs(&result.removed), vec!["a"]);
        assert_eq!(ofs(&result.added), vec!["a"]);
        let mut unchanged = ofs(&result.unchanged);
        unchanged.sort();
        assert_eq!(unchanged, vec!["b", "c"]);
    }
}
