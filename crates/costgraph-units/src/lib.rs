//! # costgraph-units
//!
//! Unit/quantity conversion layer for cost propagation.
//!
//! Heterogeneous physical units (mass, volume, length, count) are compared
//! and combined only through their dimension:
//!
//! ```text
//! UnitRegistry     ← name → (dimension, modifier to base unit)
//!     │
//! Quantity         ← (value, unit) with dimension-gated arithmetic
//!     │
//! CostError        ← tagged failure taxonomy shared by all layers
//! ```
//!
//! Nothing here is global: callers construct a [`UnitRegistry`] and pass it
//! to every operation that needs one.

pub mod error;
pub mod quantity;
pub mod registry;

pub use error::{CostError, CostErrorKind, EntityKind, TransportKind};
pub use quantity::{EQUALITY_TOLERANCE, Quantity, approx_eq, resolve_pair};
pub use registry::{Dimension, Unit, UnitRegistry};
