//! # costgraph-memory
//!
//! Memory layer for composition/dependency state.
//!
//! This crate provides:
//! - `Composition` and `Dependency` types, with the cost rollup
//! - dependency-set diffing between revisions
//! - JSONL read/write (portable persistence) and lock-scoped mutation
//! - `MemoryStore` (canonical in-memory state)
//! - `CompositionEvent` wire payloads
//!
//! It intentionally does not orchestrate cascades or talk to an event bus.
//! Those concerns live in `costgraph-cascade`.
//!
//! ## Data model
//!
//! ```text
//! JSONL (on disk, one line per composition)
//!     ↕  hydrate / flush
//! MemoryStore (deterministic in-memory projection)
//! ```

pub mod atomic_store;
pub mod composition;
pub mod dependency;
pub mod diff;
pub mod events;
pub mod jsonl;
pub mod memory;

pub use atomic_store::{AtomicStoreMutationError, mutate_store_jsonl, store_lock_path};
pub use composition::{Composition, SubvalueChange};
pub use dependency::Dependency;
pub use diff::{DependencyDiff, diff};
pub use events::{
    CompositionEvent, EVENT_COMPOSITION_CREATED, EVENT_COMPOSITION_DELETED,
    EVENT_COMPOSITION_UPDATED_MANUALLY, EVENT_COMPOSITION_USES_UPDATED,
    EVENT_COMPOSITIONS_UPDATED_AUTOMATICALLY,
};
pub use jsonl::{
    JsonlError, read_compositions, read_compositions_from_path, write_compositions,
    write_compositions_to_path,
};
pub use memory::{MemoryStore, MemoryStoreError};
