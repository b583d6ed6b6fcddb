//! Composition type: a bill-of-materials node and its cost rollup.

use chrono::{DateTime, Utc};
use costgraph_units::{CostError, Quantity, UnitRegistry, approx_eq, resolve_pair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dependency::Dependency;

/// An item whose cost may derive from other compositions.
///
/// `cost` is the price of one `unit` of the composition. When
/// `autoupdate_cost` is set and dependencies exist, it equals the sum of the
/// dependency subvalues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    // ── Identity ──
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    // ── Cost & quantity ──
    #[serde(default)]
    pub cost: f64,
    pub unit: Quantity,
    #[serde(default)]
    pub stock: Quantity,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    // ── Flags ──
    #[serde(default = "default_true")]
    pub autoupdate_cost: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub needs_uses_recompute: bool,

    // ── Timestamps ──
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Outcome of refreshing one dependency's cached subvalue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubvalueChange {
    pub previous: f64,
    pub current: f64,
}

impl SubvalueChange {
    pub fn changed(&self) -> bool {
        !approx_eq(self.previous, self.current)
    }
}

impl Composition {
    pub fn new(id: impl Into<String>, unit: Quantity, stock: Quantity) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: String::new(),
            cost: 0.0,
            unit,
            stock,
            dependencies: Vec::new(),
            autoupdate_cost: true,
            enabled: true,
            needs_uses_recompute: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// New composition with a fresh random identity.
    pub fn create(unit: Quantity, stock: Quantity) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), unit, stock)
    }

    pub fn touch_updated_at(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `cost = Σ dependencies[i].subvalue`.
    ///
    /// Reads only cached subvalues; cross-composition work happens when a
    /// subvalue is refreshed.
    pub fn calculate_cost(&mut self) {
        self.cost = self.dependencies.iter().map(|dep| dep.subvalue).sum();
    }

    /// Apply [`Composition::calculate_cost`] when the cost is derived, i.e.
    /// `autoupdate_cost` is set and there is at least one dependency.
    ///
    /// Returns whether the cost was recalculated.
    pub fn rollup(&mut self) -> bool {
        if self.autoupdate_cost && !self.dependencies.is_empty() {
            self.calculate_cost();
            true
        } else {
            false
        }
    }

    /// Cost of an arbitrary quantity of this composition:
    /// `q.normalize() / unit.normalize() * cost`.
    pub fn cost_from_quantity(
        &self,
        quantity: &Quantity,
        registry: &UnitRegistry,
    ) -> Result<f64, CostError> {
        let (requested, own) = resolve_pair(&quantity.unit, &self.unit.unit, registry)?;
        let own_base = self.unit.value * own.modifier;
        if own_base == 0.0 {
            return Err(CostError::validation(
                "unit",
                format!("composition {} has a zero unit quantity", self.id),
            ));
        }
        Ok(quantity.value * requested.modifier / own_base * self.cost)
    }

    pub fn dependency(&self, of: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|dep| dep.of == of)
    }

    pub fn uses_composition(&self, of: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.of == of)
    }

    /// Replace the quantity of the dependency on `dependency.of`, or append
    /// it. The subvalue of a replaced entry is left for the caller to refresh.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert_dependency(&mut self, dependency: Dependency) -> bool {
        match self
            .dependencies
            .iter_mut()
            .find(|existing| existing.of == dependency.of)
        {
            Some(existing) => {
                existing.quantity = dependency.quantity;
                true
            }
            None => {
                self.dependencies.push(dependency);
                false
            }
        }
    }

    /// Remove the dependency on `of`, returning it.
    pub fn remove_dependency(&mut self, of: &str) -> Result<Dependency, CostError> {
        let idx = self
            .dependencies
            .iter()
            .position(|dep| dep.of == of)
            .ok_or_else(|| CostError::dependency_not_found(of))?;
        Ok(self.dependencies.remove(idx))
    }

    /// Recompute the cached subvalue of the dependency on `referenced`.
    ///
    /// This is the edge where one composition's cost enters another's.
    pub fn refresh_subvalue(
        &mut self,
        referenced: &Composition,
        registry: &UnitRegistry,
    ) -> Result<SubvalueChange, CostError> {
        let dep = self
            .dependencies
            .iter_mut()
            .find(|dep| dep.of == referenced.id)
            .ok_or_else(|| CostError::dependency_not_found(&referenced.id))?;
        let current = dep.compute_subvalue(referenced, registry)?;
        let previous = dep.subvalue;
        dep.subvalue = current;
        Ok(SubvalueChange { previous, current })
    }

    /// Check the entity-local invariants: valid non-empty unit with a
    /// positive amount, valid non-empty stock, valid dependency quantities,
    /// no self-reference and no duplicate `of`.
    ///
    /// Compatibility of dependency quantities with the referenced
    /// compositions needs the store and is checked by the caller.
    pub fn validate(&self, registry: &UnitRegistry) -> Result<(), CostError> {
        if self.id.trim().is_empty() {
            return Err(CostError::validation("id", "must not be empty"));
        }
        self.unit.validate("unit", registry)?;
        if self.unit.value <= 0.0 {
            return Err(CostError::validation("unit", "value must be positive"));
        }
        self.stock.validate("stock", registry)?;
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(CostError::validation(
                "cost",
                format!("must be non-negative, got {}", self.cost),
            ));
        }

        let mut seen = BTreeSet::new();
        for (idx, dep) in self.dependencies.iter().enumerate() {
            if dep.of == self.id {
                return Err(CostError::validation(
                    format!("dependencies[{idx}].of"),
                    "a composition cannot depend on itself",
                ));
            }
            if !seen.insert(dep.of.as_str()) {
                return Err(CostError::validation(
                    format!("dependencies[{idx}].of"),
                    format!("duplicate dependency on {}", dep.of),
                ));
            }
            dep.quantity
                .validate(&format!("dependencies[{idx}].quantity"), registry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgraph_units::CostErrorKind;

    fn priced(id: &str, cost: f64, unit: Quantity) -> Composition {
        let mut composition = Composition::new(id, unit, Quantity::new(0.0, "u"));
        composition.cost = cost;
        composition
    }

    #[test]
    fn calculate_cost_sums_subvalues() {
        let mut bread = priced("c-bread", 0.0, Quantity::new(1.0, "u"));
        let mut flour = Dependency::new("c-flour", Quantity::new(1.0, "kg"));
        flour.subvalue = 100.0;
        let mut butter = Dependency::new("c-butter", Quantity::new(1.0, "kg"));
        butter.subvalue = 250.0;
        bread.dependencies = vec![flour, butter];

        bread.calculate_cost();
        assert_eq!(bread.cost, 350.0);
    }

    #[test]
    fn rollup_respects_manual_cost() {
        let mut bread = priced("c-bread", 42.0, Quantity::new(1.0, "u"));
        let mut flour = Dependency::new("c-flour", Quantity::new(1.0, "kg"));
        flour.subvalue = 10.0;
        bread.dependencies.push(flour);

        bread.autoupdate_cost = false;
        assert!(!bread.rollup());
        assert_eq!(bread.cost, 42.0);

        bread.autoupdate_cost = true;
        assert!(bread.rollup());
        assert_eq!(bread.cost, 10.0);
    }

    #[test]
    fn rollup_keeps_raw_cost_without_dependencies() {
        let mut flour = priced("c-flour", 200.0, Quantity::new(2.0, "kg"));
        assert!(!flour.rollup());
        assert_eq!(flour.cost, 200.0);
    }

    #[test]
    fn cost_from_quantity_is_proportional() {
        let registry = UnitRegistry::standard();
        let cheese = priced("c-cheese", 50.0, Quantity::new(2.0, "kg"));

        let cost = |q: Quantity| cheese.cost_from_quantity(&q, &registry);
        assert_eq!(cost(Quantity::new(1000.0, "g")), Ok(25.0));
        assert_eq!(cost(Quantity::new(500.0, "g")), Ok(12.5));
        assert_eq!(cost(Quantity::new(3.0, "kg")), Ok(75.0));

        let err = cost(Quantity::new(1.0, "l")).expect_err("volume vs mass");
        assert_eq!(err.kind(), CostErrorKind::IncompatibleUnits);
    }

    #[test]
    fn upsert_appends_or_replaces_in_place() {
        let mut bread = priced("c-bread", 0.0, Quantity::new(1.0, "u"));
        assert!(!bread.upsert_dependency(Dependency::new("a", Quantity::new(1.0, "kg"))));
        assert!(!bread.upsert_dependency(Dependency::new("b", Quantity::new(1.0, "l"))));
        assert_eq!(bread.dependencies.len(), 2);

        let mut cached = bread.dependencies[0].clone();
        cached.subvalue = 7.0;
        bread.dependencies[0] = cached;

        assert!(bread.upsert_dependency(Dependency::new("a", Quantity::new(3.0, "kg"))));
        assert_eq!(bread.dependencies.len(), 2);
        assert_eq!(bread.dependencies[0].of, "a");
        assert_eq!(bread.dependencies[0].quantity, Quantity::new(3.0, "kg"));
        assert_eq!(bread.dependencies[0].subvalue, 7.0);
        assert_eq!(bread.dependencies[1].of, "b");
    }

    #[test]
    fn remove_unknown_dependency_is_not_found() {
        let mut bread = priced("c-bread", 0.0, Quantity::new(1.0, "u"));
        bread.upsert_dependency(Dependency::new("a", Quantity::new(1.0, "kg")));

        let err = bread.remove_dependency("zzz").expect_err("missing dep");
        assert_eq!(err.kind(), CostErrorKind::NotFound);
        let removed = bread.remove_dependency("a").expect("existing dep");
        assert_eq!(removed.of, "a");
        assert!(bread.dependencies.is_empty());
    }

    #[test]
    fn refresh_subvalue_reports_change() {
        let registry = UnitRegistry::standard();
        let mut flour = priced("c-flour", 200.0, Quantity::new(2.0, "kg"));
        let mut dough = priced("c-dough", 0.0, Quantity::new(1.0, "kg"));
        dough.upsert_dependency(Dependency::new("c-flour", Quantity::new(0.2, "kg")));

        let change = dough.refresh_subvalue(&flour, &registry).expect("refresh");
        assert!(change.changed());
        assert!(approx_eq(change.current, 20.0));

        let again = dough.refresh_subvalue(&flour, &registry).expect("refresh");
        assert!(!again.changed());

        flour.cost = 300.0;
        let bumped = dough.refresh_subvalue(&flour, &registry).expect("refresh");
        assert!(approx_eq(bumped.current, 30.0));
    }

    #[test]
    fn validate_rejects_bad_units_and_self_reference() {
        let registry = UnitRegistry::standard();
        let ok = priced("c-ok", 1.0, Quantity::new(1.0, "kg"));
        assert!(ok.validate(&registry).is_ok());

        let mut no_unit = ok.clone();
        no_unit.unit = Quantity::empty();
        assert_eq!(
            no_unit.validate(&registry).map_err(|e| e.kind()),
            Err(CostErrorKind::ValidationFailure)
        );

        let mut bad_stock = ok.clone();
        bad_stock.stock = Quantity::new(1.0, "bushel");
        assert!(bad_stock.validate(&registry).is_err());

        let mut selfish = ok.clone();
        selfish.upsert_dependency(Dependency::new("c-ok", Quantity::new(1.0, "kg")));
        assert!(selfish.validate(&registry).is_err());
    }

    #[test]
    fn composition_accepts_camel_case_wire_fields() {
        let raw = r#"{
            "id":"c-1",
            "cost":12.5,
            "unit":{"value":1,"unit":"kg"},
            "stock":{"value":3,"unit":"kg"},
            "autoupdateCost":false,
            "needsUsesRecompute":true
        }"#;
        let composition: Composition = serde_json::from_str(raw).expect("must parse");
        assert!(!composition.autoupdate_cost);
        assert!(composition.enabled);
        assert!(composition.needs_uses_recompute);
        assert!(composition.dependencies.is_empty());
    }
}
