//! Dependency edges: one composition requiring a quantity of another.

use costgraph_units::{CostError, Quantity, UnitRegistry};
use serde::{Deserialize, Serialize};

use crate::composition::Composition;

/// A required quantity of another composition plus its cached contribution.
///
/// `of` is a lookup key, not an owning reference: the referenced composition
/// lives in the store and may be disabled independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub of: String,
    pub quantity: Quantity,
    /// Monetary contribution of this edge to the owner's cost.
    #[serde(default)]
    pub subvalue: f64,
}

impl Dependency {
    pub fn new(of: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            of: of.into(),
            quantity,
            subvalue: 0.0,
        }
    }

    /// Identity comparison: same `of` and equal quantity. The cached
    /// subvalue is ignored.
    pub fn same_as(&self, other: &Dependency, registry: &UnitRegistry) -> bool {
        self.of == other.of && self.quantity.equals(&other.quantity, registry)
    }

    /// Contribution of `referenced` for this edge's quantity.
    ///
    /// A disabled composition contributes nothing.
    pub fn compute_subvalue(
        &self,
        referenced: &Composition,
        registry: &UnitRegistry,
    ) -> Result<f64, CostError> {
        if referenced.id != self.of {
            return Err(CostError::validation(
                "dependency.of",
                format!(
                    "dependency references {} but {} was supplied",
                    self.of, referenced.id
                ),
            ));
        }
        if !referenced.enabled {
            return Ok(0.0);
        }
        referenced.cost_from_quantity(&self.quantity, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_parses_without_subvalue() {
        let raw = r#"{
            "of":"c-flour",
            "quantity":{"value":0.2,"unit":"kg"}
        }"#;

        let dep: Dependency = serde_json::from_str(raw).expect("must parse dependency");
        assert_eq!(dep.of, "c-flour");
        assert_eq!(dep.subvalue, 0.0);
    }

    #[test]
    fn identity_ignores_subvalue_and_unit_spelling() {
        let registry = UnitRegistry::standard();
        let mut left = Dependency::new("c-a", Quantity::new(0.5, "kg"));
        left.subvalue = 10.0;
        let right = Dependency::new("c-a", Quantity::new(500.0, "g"));
        assert!(left.same_as(&right, &registry));

        let other = Dependency::new("c-b", Quantity::new(0.5, "kg"));
        assert!(!left.same_as(&other, &registry));
    }

    #[test]
    fn disabled_reference_contributes_nothing() {
        let registry = UnitRegistry::standard();
        let mut flour = Composition::new("c-flour", Quantity::new(1.0, "kg"), Quantity::empty());
        flour.cost = 40.0;
        let dep = Dependency::new("c-flour", Quantity::new(0.5, "kg"));
        assert_eq!(dep.compute_subvalue(&flour, &registry), Ok(20.0));

        flour.enabled = false;
        assert_eq!(dep.compute_subvalue(&flour, &registry), Ok(0.0));
    }
}
