//! Cascade layer for composition costs.
//!
//! This crate wires the memory layer (`costgraph-memory`) to collaborators:
//! - a repository contract with in-memory and JSONL backends
//! - an event-bus contract with an in-process broker
//! - `CompositionService`, the entry point for manual edits
//! - `CascadeCoordinator`, which consumes change events and pushes cost
//!   changes through every composition that uses the changed one
//!
//! ```text
//! service edit ─▶ persist ─▶ publish(changed)
//!                                 │
//!      coordinator worker ◀───────┘
//!        refresh uses ─▶ persist ─▶ publish(automatic) ─▶ next wave
//! ```

pub mod bus;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod locks;
pub mod repository;
pub mod service;

pub use bus::{
    Acknowledger, BusError, Delivery, DeliveryStream, EventBus, ExchangeKind, MemoryBus,
    OutboundMessage, Routing, Subscription, publish_event, topic_matches,
};
pub use config::{
    BusConfig, CascadeConfig, ConfigError, CostgraphConfig, DEFAULT_CONFIG_FILE,
    DEFAULT_LOG_FILTER, DEFAULT_STORE_PATH, LogConfig, StoreConfig, Topology,
};
pub use context::CascadeContext;
pub use coordinator::{
    CascadeCoordinator, CoordinatorHandle, UseFailure, WavePhase, WaveReport,
};
pub use locks::KeyedLocks;
pub use repository::{
    CompositionRepository, DEFAULT_LOCK_RETRIES, DEFAULT_LOCK_RETRY_DELAY, JsonlRepository,
    MemoryRepository, RepositoryError,
};
pub use service::{CompositionPatch, CompositionService, NewComposition};
