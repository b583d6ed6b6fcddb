//! Manual mutation entry point.
//!
//! Each mutation runs under the composition's lock: load, apply the edit,
//! recompute subvalues for dependencies the diff reports as added, roll the
//! cost up, mark `needs_uses_recompute`, persist, then publish the event
//! that starts the cascade.

use crate::bus::publish_event;
use crate::context::CascadeContext;
use crate::repository::RepositoryError;
use costgraph_memory::{Composition, CompositionEvent, Dependency, diff};
use costgraph_units::{CostError, Quantity, resolve_pair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Input for [`CompositionService::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComposition {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: f64,
    pub unit: Quantity,
    #[serde(default)]
    pub stock: Quantity,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default = "default_autoupdate")]
    pub autoupdate_cost: bool,
}

fn default_autoupdate() -> bool {
    true
}

impl NewComposition {
    /// Stock starts at zero in the unit's own unit.
    pub fn new(unit: Quantity) -> Self {
        let stock = Quantity::new(0.0, unit.unit.clone());
        Self {
            id: None,
            name: String::new(),
            cost: 0.0,
            unit,
            stock,
            dependencies: Vec::new(),
            autoupdate_cost: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Raw cost. Ignored once dependencies drive the cost.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_autoupdate_cost(mut self, enabled: bool) -> Self {
        self.autoupdate_cost = enabled;
        self
    }

    pub fn with_stock(mut self, stock: Quantity) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_dependency(mut self, of: impl Into<String>, quantity: Quantity) -> Self {
        self.dependencies.push(Dependency::new(of, quantity));
        self
    }
}

/// Partial update. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositionPatch {
    pub name: Option<String>,
    pub cost: Option<f64>,
    pub unit: Option<Quantity>,
    pub stock: Option<Quantity>,
    pub autoupdate_cost: Option<bool>,
    pub dependencies: Option<Vec<Dependency>>,
}

#[derive(Debug, Clone)]
pub struct CompositionService {
    ctx: CascadeContext,
}

impl CompositionService {
    pub fn new(ctx: CascadeContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &CascadeContext {
        &self.ctx
    }

    pub async fn get(&self, id: &str) -> Result<Composition, CostError> {
        Ok(self.ctx.repo.find_by_id(id).await?)
    }

    /// All compositions in ID order; disabled ones only when asked.
    pub async fn list(&self, include_disabled: bool) -> Result<Vec<Composition>, CostError> {
        let mut all = self.ctx.repo.find_all().await?;
        if !include_disabled {
            all.retain(|composition| composition.enabled);
        }
        Ok(all)
    }

    pub async fn create(&self, draft: NewComposition) -> Result<Composition, CostError> {
        let stock = if draft.stock.is_empty() {
            Quantity::new(0.0, draft.unit.unit.clone())
        } else {
            draft.stock
        };
        let mut composition = match draft.id {
            Some(id) => Composition::new(id, draft.unit, stock),
            None => Composition::create(draft.unit, stock),
        };
        composition.name = draft.name;
        composition.cost = draft.cost;
        composition.autoupdate_cost = draft.autoupdate_cost;
        composition.dependencies = draft.dependencies;

        let _guard = self.ctx.locks.lock(&composition.id).await;
        composition.validate(&self.ctx.registry)?;
        let requested = std::mem::take(&mut composition.dependencies);
        composition.dependencies = self.resolve_dependencies(&[], requested).await?;
        composition.rollup();
        composition.needs_uses_recompute = true;
        composition.validate(&self.ctx.registry)?;

        self.ctx.repo.insert(&composition).await?;
        info!(composition_id = %composition.id, cost = composition.cost, "composition created");
        self.announce(CompositionEvent::CompositionCreated {
            composition: composition.clone(),
        })
        .await?;
        Ok(composition)
    }

    pub async fn update(&self, id: &str, patch: CompositionPatch) -> Result<Composition, CostError> {
        self.edit(id, move |_| Ok(patch)).await
    }

    /// Replace the whole dependency list.
    pub async fn update_dependencies(
        &self,
        id: &str,
        dependencies: Vec<Dependency>,
    ) -> Result<Composition, CostError> {
        self.update(
            id,
            CompositionPatch {
                dependencies: Some(dependencies),
                ..CompositionPatch::default()
            },
        )
        .await
    }

    pub async fn upsert_dependency(
        &self,
        id: &str,
        dependency: Dependency,
    ) -> Result<Composition, CostError> {
        self.edit(id, move |current| {
            let mut next = current.clone();
            next.upsert_dependency(dependency);
            Ok(CompositionPatch {
                dependencies: Some(next.dependencies),
                ..CompositionPatch::default()
            })
        })
        .await
    }

    pub async fn remove_dependency(&self, id: &str, of: &str) -> Result<Composition, CostError> {
        self.edit(id, |current| {
            let mut next = current.clone();
            next.remove_dependency(of)?;
            Ok(CompositionPatch {
                dependencies: Some(next.dependencies),
                ..CompositionPatch::default()
            })
        })
        .await
    }

    /// Manual cost override. Rejected while the cost is derived from
    /// dependencies.
    pub async fn set_cost(&self, id: &str, cost: f64) -> Result<Composition, CostError> {
        self.update(
            id,
            CompositionPatch {
                cost: Some(cost),
                ..CompositionPatch::default()
            },
        )
        .await
    }

    pub async fn set_autoupdate_cost(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<Composition, CostError> {
        self.update(
            id,
            CompositionPatch {
                autoupdate_cost: Some(enabled),
                ..CompositionPatch::default()
            },
        )
        .await
    }

    /// Soft delete. Uses are recomputed with a zero contribution.
    pub async fn delete(&self, id: &str) -> Result<Composition, CostError> {
        let _guard = self.ctx.locks.lock(id).await;
        let current = self.ctx.repo.find_by_id(id).await?;
        if !current.enabled {
            return Err(CostError::validation(
                "enabled",
                format!("composition {id} is already deleted"),
            ));
        }

        let mut deleted = self.ctx.repo.delete(id).await?;
        deleted.needs_uses_recompute = true;
        self.ctx.repo.update(&deleted).await?;
        info!(composition_id = %id, "composition deleted");
        self.announce(CompositionEvent::CompositionDeleted {
            composition: deleted.clone(),
        })
        .await?;
        Ok(deleted)
    }

    async fn edit<F>(&self, id: &str, build: F) -> Result<Composition, CostError>
    where
        F: FnOnce(&Composition) -> Result<CompositionPatch, CostError>,
    {
        let _guard = self.ctx.locks.lock(id).await;
        let current = self.ctx.repo.find_by_id(id).await?;
        if !current.enabled {
            return Err(CostError::validation(
                "enabled",
                format!("composition {id} is deleted"),
            ));
        }
        let patch = build(&current)?;
        let mut next = current.clone();

        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(stock) = patch.stock {
            next.stock = stock;
        }
        if let Some(flag) = patch.autoupdate_cost {
            next.autoupdate_cost = flag;
        }
        if let Some(unit) = patch.unit {
            self.check_unit_against_uses(&next.id, &unit).await?;
            next.unit = unit;
        }
        if let Some(dependencies) = patch.dependencies {
            next.dependencies = dependencies;
            next.validate(&self.ctx.registry)?;
            let requested = std::mem::take(&mut next.dependencies);
            next.dependencies = self
                .resolve_dependencies(&current.dependencies, requested)
                .await?;
        }
        if let Some(cost) = patch.cost {
            if next.autoupdate_cost && !next.dependencies.is_empty() {
                return Err(CostError::validation(
                    "cost",
                    "cost is derived from dependencies; disable autoupdate first",
                ));
            }
            next.cost = cost;
        }

        next.rollup();
        next.needs_uses_recompute = true;
        next.touch_updated_at();
        next.validate(&self.ctx.registry)?;

        self.ctx.repo.update(&next).await?;
        info!(composition_id = %next.id, cost = next.cost, "composition updated");
        self.announce(CompositionEvent::CompositionUpdatedManually {
            composition: next.clone(),
        })
        .await?;
        Ok(next)
    }

    /// Carry over unchanged entries with their cached subvalue and compute
    /// the subvalue of every added entry. Requested order is kept.
    async fn resolve_dependencies(
        &self,
        previous: &[Dependency],
        requested: Vec<Dependency>,
    ) -> Result<Vec<Dependency>, CostError> {
        let registry = &self.ctx.registry;
        let delta = diff(previous, &requested, registry);
        if !delta.is_empty() {
            debug!(
                removed = delta.removed.len(),
                added = delta.added.len(),
                touched = ?delta.touched_ids(),
                "dependency set changed"
            );
        }

        let mut unchanged = delta.unchanged;
        let mut resolved = Vec::with_capacity(requested.len());
        for mut dependency in requested {
            if let Some(idx) = unchanged
                .iter()
                .position(|kept| kept.same_as(&dependency, registry))
            {
                resolved.push(unchanged.swap_remove(idx));
                continue;
            }

            let referenced = match self.ctx.repo.find_by_id(&dependency.of).await {
                Ok(found) => found,
                Err(RepositoryError::NotFound(of)) => {
                    return Err(CostError::composition_not_found(of));
                }
                Err(other) => return Err(other.into()),
            };
            if !referenced.enabled {
                return Err(CostError::validation(
                    "dependencies.of",
                    format!("composition {} is deleted", referenced.id),
                ));
            }
            dependency.subvalue = dependency.compute_subvalue(&referenced, registry)?;
            resolved.push(dependency);
        }
        Ok(resolved)
    }

    /// Every use must still be able to express its quantity in `unit`.
    async fn check_unit_against_uses(&self, id: &str, unit: &Quantity) -> Result<(), CostError> {
        for using in self.ctx.repo.find_uses(id).await? {
            if let Some(edge) = using.dependency(id) {
                resolve_pair(&edge.quantity.unit, &unit.unit, &self.ctx.registry)?;
            }
        }
        Ok(())
    }

    async fn announce(&self, event: CompositionEvent) -> Result<(), CostError> {
        publish_event(&*self.ctx.bus, &event, &self.ctx.topology.changed).await?;
        Ok(())
    }
}
