//! Error taxonomy shared by every costgraph layer.

use serde::{Deserialize, Serialize};

/// Errors arising from unit arithmetic, cost conversion, or collaborator I/O.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CostError {
    /// A unit name is absent from the registry.
    #[error("unknown unit: {unit:?}")]
    UnknownUnit { unit: String },

    /// Two quantities belong to different dimensions.
    #[error(
        "incompatible units: {left} ({left_dimension}) and {right} ({right_dimension})"
    )]
    IncompatibleUnits {
        left: String,
        right: String,
        left_dimension: String,
        right_dimension: String,
    },

    /// A composition or dependency does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// An entity carries an invalid unit, quantity, or field value.
    #[error("validation failure on {field}: {reason}")]
    ValidationFailure { field: String, reason: String },

    /// Repository or event-bus I/O failed.
    #[error("{source_kind} failure: {message}")]
    TransportFailure {
        source_kind: TransportKind,
        message: String,
    },
}

/// Discriminant of [`CostError`] for callers that only branch on the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostErrorKind {
    UnknownUnit,
    IncompatibleUnits,
    NotFound,
    ValidationFailure,
    TransportFailure,
}

impl CostErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostErrorKind::UnknownUnit => "unknown_unit",
            CostErrorKind::IncompatibleUnits => "incompatible_units",
            CostErrorKind::NotFound => "not_found",
            CostErrorKind::ValidationFailure => "validation_failure",
            CostErrorKind::TransportFailure => "transport_failure",
        }
    }
}

/// Which entity a [`CostError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Composition,
    Dependency,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Composition => f.write_str("composition"),
            EntityKind::Dependency => f.write_str("dependency"),
        }
    }
}

/// Which collaborator a [`CostError::TransportFailure`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Repository,
    EventBus,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Repository => f.write_str("repository"),
            TransportKind::EventBus => f.write_str("event bus"),
        }
    }
}

impl CostError {
    pub fn kind(&self) -> CostErrorKind {
        match self {
            CostError::UnknownUnit { .. } => CostErrorKind::UnknownUnit,
            CostError::IncompatibleUnits { .. } => CostErrorKind::IncompatibleUnits,
            CostError::NotFound { .. } => CostErrorKind::NotFound,
            CostError::ValidationFailure { .. } => CostErrorKind::ValidationFailure,
            CostError::TransportFailure { .. } => CostErrorKind::TransportFailure,
        }
    }

    pub fn unknown_unit(unit: impl Into<String>) -> Self {
        CostError::UnknownUnit { unit: unit.into() }
    }

    pub fn composition_not_found(id: impl Into<String>) -> Self {
        CostError::NotFound {
            kind: EntityKind::Composition,
            id: id.into(),
        }
    }

    pub fn dependency_not_found(of: impl Into<String>) -> Self {
        CostError::NotFound {
            kind: EntityKind::Dependency,
            id: of.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CostError::ValidationFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        CostError::TransportFailure {
            source_kind: TransportKind::Repository,
            message: message.into(),
        }
    }

    pub fn event_bus(message: impl Into<String>) -> Self {
        CostError::TransportFailure {
            source_kind: TransportKind::EventBus,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            CostError::unknown_unit("furlong").kind(),
            CostErrorKind::UnknownUnit
        );
        assert_eq!(
            CostError::composition_not_found("c-1").kind(),
            CostErrorKind::NotFound
        );
        assert_eq!(
            CostError::repository("disk full").kind(),
            CostErrorKind::TransportFailure
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CostError::dependency_not_found("c-7");
        assert_eq!(err.to_string(), "dependency not found: c-7");
    }
}
