//! Canonical in-memory representation of composition state.
//!
//! This is the memory boundary for `costgraph-memory`:
//! - load/store JSONL
//! - expose deterministic composition and reverse-dependency queries
//! - avoid orchestration concerns (no event bus coupling here)

use crate::composition::Composition;
use crate::jsonl::{JsonlError, read_compositions_from_path, write_compositions_to_path};
use costgraph_units::CostError;
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading or querying the memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error("composition not found: {0}")]
    CompositionNotFound(String),

    #[error("composition already exists: {0}")]
    CompositionAlreadyExists(String),
}

impl From<MemoryStoreError> for CostError {
    fn from(err: MemoryStoreError) -> Self {
        match err {
            MemoryStoreError::CompositionNotFound(id) => CostError::composition_not_found(id),
            MemoryStoreError::CompositionAlreadyExists(id) => {
                CostError::validation("id", format!("composition already exists: {id}"))
            }
            MemoryStoreError::Jsonl(source) => CostError::repository(source.to_string()),
        }
    }
}

/// Canonical in-memory state for compositions, keyed by ID.
///
/// Edges are stored on the owning composition only; reverse lookups scan,
/// which keeps the store free of pointer cycles.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    compositions: BTreeMap<String, Composition>,
}

impl MemoryStore {
    /// Build a store from fully-materialized compositions.
    ///
    /// Duplicate IDs are resolved with deterministic last-write-wins semantics.
    pub fn from_compositions(compositions: Vec<Composition>) -> Self {
        let mut index = BTreeMap::new();
        for composition in compositions {
            index.insert(composition.id.clone(), composition);
        }
        Self {
            compositions: index,
        }
    }

    /// Load store state from a JSONL file. A missing file is an empty store.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, MemoryStoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let compositions = read_compositions_from_path(path)?;
        Ok(Self::from_compositions(compositions))
    }

    /// Persist store state to a JSONL file.
    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<(), MemoryStoreError> {
        let compositions: Vec<Composition> = self.compositions.values().cloned().collect();
        write_compositions_to_path(path, &compositions)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }

    /// Lookup one composition by ID, disabled ones included.
    pub fn composition(&self, id: &str) -> Option<&Composition> {
        self.compositions.get(id)
    }

    pub fn composition_mut(&mut self, id: &str) -> Option<&mut Composition> {
        self.compositions.get_mut(id)
    }

    /// Insert a new composition; an existing ID is rejected.
    pub fn insert(&mut self, composition: Composition) -> Result<(), MemoryStoreError> {
        if self.compositions.contains_key(&composition.id) {
            return Err(MemoryStoreError::CompositionAlreadyExists(
                composition.id.clone(),
            ));
        }
        self.compositions.insert(composition.id.clone(), composition);
        Ok(())
    }

    /// Replace an existing composition; an unknown ID is rejected.
    pub fn update(&mut self, composition: Composition) -> Result<(), MemoryStoreError> {
        match self.compositions.get_mut(&composition.id) {
            Some(slot) => {
                *slot = composition;
                Ok(())
            }
            None => Err(MemoryStoreError::CompositionNotFound(composition.id)),
        }
    }

    /// Insert or replace by ID. Returns the previous value if present.
    pub fn upsert(&mut self, composition: Composition) -> Option<Composition> {
        self.compositions.insert(composition.id.clone(), composition)
    }

    /// Soft delete: mark disabled, never remove.
    pub fn disable(&mut self, id: &str) -> Result<&Composition, MemoryStoreError> {
        let composition = self
            .compositions
            .get_mut(id)
            .ok_or_else(|| MemoryStoreError::CompositionNotFound(id.to_string()))?;
        composition.enabled = false;
        composition.touch_updated_at();
        Ok(composition)
    }

    /// Iterate all compositions in deterministic ID order.
    pub fn compositions(&self) -> impl Iterator<Item = &Composition> {
        self.compositions.values()
    }

    /// Iterate enabled compositions in ID order.
    pub fn enabled(&self) -> impl Iterator<Item = &Composition> {
        self.compositions.values().filter(|c| c.enabled)
    }

    /// Enabled compositions whose dependency list references `id`.
    pub fn uses_of(&self, id: &str) -> Vec<&Composition> {
        self.enabled()
            .filter(|composition| composition.uses_composition(id))
            .collect()
    }
}
