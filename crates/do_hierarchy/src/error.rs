//! Error types for the hierarchy registry.

use crate::diagnostics::DiagnosticRecord;

/// Hard failures raised by the hierarchy API.
///
/// Every variant except [`HierarchyError::Poisoned`] carries the record that
/// was written to the diagnostics channel for the failing call.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    /// `store` for an id that is already registered
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(Box<DiagnosticRecord>),
    /// `delete` for an id that is not registered
    #[error("missing id: {0}")]
    MissingId(Box<DiagnosticRecord>),
    /// `delete` naming a parent that has no children
    #[error("missing parent: {0}")]
    MissingParent(Box<DiagnosticRecord>),
    /// `delete` naming a zone that is empty under its parent
    #[error("missing zone: {0}")]
    MissingZone(Box<DiagnosticRecord>),
    /// `delete` naming a cell that does not hold the id
    #[error("id not in cell: {0}")]
    NotInCell(Box<DiagnosticRecord>),
    /// The index and the membership set disagree
    #[error("invariant breach: {0}")]
    InvariantBreach(Box<DiagnosticRecord>),
    /// The API was called with an inconsistent set of arguments
    #[error("misuse: {0}")]
    Misuse(Box<DiagnosticRecord>),
    /// A previous invariant breach stopped the table; call `clear()` to recover
    #[error("hierarchy table is poisoned by an earlier invariant breach")]
    Poisoned,
}

impl HierarchyError {
    /// The diagnostics record behind this failure, if any.
    pub fn record(&self) -> Option<&DiagnosticRecord> {
        match self {
            HierarchyError::DuplicateRegistration(record)
            | HierarchyError::MissingId(record)
            | HierarchyError::MissingParent(record)
            | HierarchyError::MissingZone(record)
            | HierarchyError::NotInCell(record)
            | HierarchyError::InvariantBreach(record)
            | HierarchyError::Misuse(record) => Some(record),
            HierarchyError::Poisoned => None,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
