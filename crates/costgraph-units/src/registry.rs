//! Unit catalogue grouped by physical dimension.
//!
//! A registry is built once and then only read. It is passed explicitly to
//! every operation that needs it, so tests and callers can run several
//! configurations side by side.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CostError;

/// Physical quantity kind that gates whether two units are interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Volume,
    Length,
    Count,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Mass => "mass",
            Dimension::Volume => "volume",
            Dimension::Length => "length",
            Dimension::Count => "count",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit and its factor to the base unit of its dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub dimension: Dimension,
    pub modifier: f64,
}

impl Unit {
    pub fn new(name: impl Into<String>, dimension: Dimension, modifier: f64) -> Self {
        Self {
            name: name.into(),
            dimension,
            modifier,
        }
    }
}

const STANDARD_UNITS: &[(&str, Dimension, f64)] = &[
    // mass, base gram
    ("mg", Dimension::Mass, 0.001),
    ("g", Dimension::Mass, 1.0),
    ("kg", Dimension::Mass, 1_000.0),
    ("t", Dimension::Mass, 1_000_000.0),
    ("oz", Dimension::Mass, 28.349_523_125),
    ("lb", Dimension::Mass, 453.592_37),
    // volume, base millilitre
    ("ml", Dimension::Volume, 1.0),
    ("cl", Dimension::Volume, 10.0),
    ("dl", Dimension::Volume, 100.0),
    ("l", Dimension::Volume, 1_000.0),
    ("m3", Dimension::Volume, 1_000_000.0),
    ("tsp", Dimension::Volume, 4.928_921_593_75),
    ("tbsp", Dimension::Volume, 14.786_764_781_25),
    ("cup", Dimension::Volume, 236.588_236_5),
    ("gal", Dimension::Volume, 3_785.411_784),
    // length, base metre
    ("mm", Dimension::Length, 0.001),
    ("cm", Dimension::Length, 0.01),
    ("m", Dimension::Length, 1.0),
    ("km", Dimension::Length, 1_000.0),
    ("in", Dimension::Length, 0.0254),
    ("ft", Dimension::Length, 0.3048),
    // count, base unit
    ("u", Dimension::Count, 1.0),
    ("pair", Dimension::Count, 2.0),
    ("dozen", Dimension::Count, 12.0),
];

/// Read-only catalogue of units keyed by name.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: BTreeMap<String, Unit>,
}

impl UnitRegistry {
    /// Build a registry from an explicit unit list.
    ///
    /// Every name must map to exactly one dimension and one positive, finite
    /// modifier; duplicates are rejected rather than silently overwritten.
    pub fn new(units: impl IntoIterator<Item = Unit>) -> Result<Self, CostError> {
        let mut index = BTreeMap::new();
        for unit in units {
            if unit.name.trim().is_empty() {
                return Err(CostError::validation("unit.name", "must not be empty"));
            }
            if !unit.modifier.is_finite() || unit.modifier <= 0.0 {
                return Err(CostError::validation(
                    format!("unit.{}.modifier", unit.name),
                    format!("must be positive and finite, got {}", unit.modifier),
                ));
            }
            if index.contains_key(&unit.name) {
                return Err(CostError::validation(
                    format!("unit.{}", unit.name),
                    "duplicate unit name",
                ));
            }
            index.insert(unit.name.clone(), unit);
        }
        Ok(Self { units: index })
    }

    /// The built-in mass/volume/length/count catalogue.
    pub fn standard() -> Self {
        let units = STANDARD_UNITS
            .iter()
            .map(|(name, dimension, modifier)| {
                (
                    (*name).to_string(),
                    Unit::new(*name, *dimension, *modifier),
                )
            })
            .collect();
        Self { units }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn by_name(&self, name: &str) -> Option<&Unit> {
        self.units.get(name)
    }

    /// Lookup that turns absence into [`CostError::UnknownUnit`].
    pub fn require(&self, name: &str) -> Result<&Unit, CostError> {
        self.by_name(name)
            .ok_or_else(|| CostError::unknown_unit(name))
    }

    /// All units of one dimension, in name order.
    pub fn by_dimension(&self, dimension: Dimension) -> Vec<&Unit> {
        self.units
            .values()
            .filter(|unit| unit.dimension == dimension)
            .collect()
    }

    /// Dimensions that have at least one unit.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = self.units.values().map(|u| u.dimension).collect();
        dims.sort();
        dims.dedup();
        dims
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_resolves_mass_units() {
        let registry = UnitRegistry::standard();
        let kg = registry.by_name("kg").expect("kg must be registered");
        assert_eq!(kg.dimension, Dimension::Mass);
        assert_eq!(kg.modifier, 1000.0);
        assert!(registry.exists("g"));
        assert!(!registry.exists("furlong"));
        assert!(registry.by_name("furlong").is_none());
    }

    #[test]
    fn by_dimension_only_returns_that_dimension() {
        let registry = UnitRegistry::standard();
        let lengths = registry.by_dimension(Dimension::Length);
        assert!(!lengths.is_empty());
        assert!(lengths.iter().all(|u| u.dimension == Dimension::Length));
        assert!(lengths.iter().any(|u| u.name == "km"));
    }

    #[test]
    fn standard_registry_covers_every_dimension() {
        let registry = UnitRegistry::standard();
        assert_eq!(
            registry.dimensions(),
            vec![
                Dimension::Mass,
                Dimension::Volume,
                Dimension::Length,
                Dimension::Count
            ]
        );
    }

    #[test]
    fn require_reports_unknown_unit() {
        let registry = UnitRegistry::standard();
        let err = registry.require("parsec").expect_err("unknown unit must fail");
        assert_eq!(err, CostError::unknown_unit("parsec"));
    }

    #[test]
    fn custom_registry_rejects_duplicates_and_bad_modifiers() {
        let dup = UnitRegistry::new(vec![
            Unit::new("g", Dimension::Mass, 1.0),
            Unit::new("g", Dimension::Mass, 2.0),
        ]);
        assert!(matches!(dup, Err(CostError::ValidationFailure { .. })));

        let zero = UnitRegistry::new(vec![Unit::new("g", Dimension::Mass, 0.0)]);
        assert!(matches!(zero, Err(CostError::ValidationFailure { .. })));

        let ok = UnitRegistry::new(vec![Unit::new("crate", Dimension::Count, 24.0)])
            .expect("single unit registry should build");
        assert_eq!(ok.len(), 1);
        assert!(ok.exists("crate"));
    }
}
