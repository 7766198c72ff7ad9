//! # Diagnostics Channel
//!
//! Uniform reporting of bookkeeping failures. Each [`FailureKind`] maps to a
//! [`Disposition`] that decides whether the failure is traced, warned about,
//! or raised as a [`HierarchyError`]. Whatever the disposition, a failing
//! call writes exactly one record to the channel's log category.
//!
//! | Kind                  | Default |
//! |-----------------------|---------|
//! | DuplicateRegistration | error   |
//! | MissingId             | error   |
//! | MissingParent         | error   |
//! | MissingZone           | error   |
//! | NotInCell             | error   |
//! | InvariantBreach       | error (cannot be lowered) |
//! | MisuseError           | error   |

use crate::error::HierarchyError;
use crate::logging::{LogCategory, Severity};
use crate::types::{DoId, Location, ZoneId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category of bookkeeping failure detected by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    DuplicateRegistration,
    MissingId,
    MissingParent,
    MissingZone,
    NotInCell,
    InvariantBreach,
    #[serde(rename = "MisuseError", alias = "Misuse")]
    Misuse,
}

impl FailureKind {
    pub const ALL: [FailureKind; 7] = [
        FailureKind::DuplicateRegistration,
        FailureKind::MissingId,
        FailureKind::MissingParent,
        FailureKind::MissingZone,
        FailureKind::NotInCell,
        FailureKind::InvariantBreach,
        FailureKind::Misuse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FailureKind::DuplicateRegistration => "DuplicateRegistration",
            FailureKind::MissingId => "MissingId",
            FailureKind::MissingParent => "MissingParent",
            FailureKind::MissingZone => "MissingZone",
            FailureKind::NotInCell => "NotInCell",
            FailureKind::InvariantBreach => "InvariantBreach",
            FailureKind::Misuse => "MisuseError",
        }
    }

    /// Parses a kind name as written in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "Misuse" {
            return Some(FailureKind::Misuse);
        }
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the channel does with a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Debug record only
    Trace,
    /// Warning record, call continues
    Warn,
    /// Error record, call fails
    Error,
}

impl Disposition {
    fn severity(self) -> Severity {
        match self {
            Disposition::Trace => Severity::Debug,
            Disposition::Warn => Severity::Warning,
            Disposition::Error => Severity::Error,
        }
    }

    /// Soft dispositions let the call return its no-op result.
    pub fn is_soft(self) -> bool {
        !matches!(self, Disposition::Error)
    }
}

/// A failure detected by the table, before the channel stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FailureKind,
    pub operation: &'static str,
    pub id: Option<DoId>,
    pub parent: Option<DoId>,
    pub zone: Option<ZoneId>,
    pub description: String,
}

impl Fault {
    pub fn new(kind: FailureKind, operation: &'static str, description: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            id: None,
            parent: None,
            zone: None,
            description: description.into(),
        }
    }

    pub fn with_id(mut self, id: DoId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent: DoId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_zone(mut self, zone: ZoneId) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn at(self, location: Location) -> Self {
        self.with_parent(location.parent).with_zone(location.zone)
    }
}

/// The record written to the channel for one failing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub kind: FailureKind,
    pub operation: String,
    pub id: Option<DoId>,
    pub parent: Option<DoId>,
    pub zone: Option<ZoneId>,
    pub description: String,
    pub tag: String,
}

impl DiagnosticRecord {
    fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            (
                "timestamp".to_string(),
                self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("kind".to_string(), self.kind.to_string()),
            ("operation".to_string(), self.operation.clone()),
        ];
        if let Some(id) = self.id {
            fields.push(("id".to_string(), id.to_string()));
        }
        if let Some(parent) = self.parent {
            fields.push(("parent".to_string(), parent.to_string()));
        }
        if let Some(zone) = self.zone {
            fields.push(("zone".to_string(), zone.to_string()));
        }
        fields.push(("tag".to_string(), self.tag.clone()));
        fields
    }
}

impl std::fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category, self.operation)?;
        if !self.tag.is_empty() || self.id.is_some() {
            let id = self.id.map(|id| id.to_string()).unwrap_or_default();
            write!(f, "({} {})", self.tag, id)?;
        }
        if let (Some(parent), Some(zone)) = (self.parent, self.zone) {
            write!(f, " @ ({parent}, {zone})")?;
        } else if let Some(parent) = self.parent {
            write!(f, " @ ({parent}, *)")?;
        }
        write!(f, ": {}", self.description)
    }
}

/// Default disposition table.
pub fn default_dispositions() -> HashMap<FailureKind, Disposition> {
    FailureKind::ALL
        .iter()
        .map(|kind| (*kind, Disposition::Error))
        .collect()
}

/// Routes faults to the log category according to their dispositions.
#[derive(Debug, Clone)]
pub struct DiagnosticsChannel {
    category: LogCategory,
    dispositions: HashMap<FailureKind, Disposition>,
}

impl DiagnosticsChannel {
    /// Creates a channel with the default table overlaid by `overrides`.
    pub fn new(category: LogCategory, overrides: &HashMap<FailureKind, Disposition>) -> Self {
        let mut channel = Self {
            category,
            dispositions: default_dispositions(),
        };
        for (kind, disposition) in overrides {
            channel.set_disposition(*kind, *disposition);
        }
        channel
    }

    pub fn category(&self) -> &LogCategory {
        &self.category
    }

    pub fn disposition(&self, kind: FailureKind) -> Disposition {
        if kind == FailureKind::InvariantBreach {
            return Disposition::Error;
        }
        self.dispositions
            .get(&kind)
            .copied()
            .unwrap_or(Disposition::Error)
    }

    /// Changes the disposition of a kind. InvariantBreach always stays `error`.
    pub fn set_disposition(&mut self, kind: FailureKind, disposition: Disposition) {
        if kind == FailureKind::InvariantBreach && disposition != Disposition::Error {
            self.category.warning(format!(
                "ignoring {disposition:?} disposition for InvariantBreach; it is always an error"
            ));
            return;
        }
        self.dispositions.insert(kind, disposition);
    }

    /// Reports a fault with its configured disposition.
    pub fn report(&self, fault: Fault, tag: &str) -> Result<(), HierarchyError> {
        let disposition = self.disposition(fault.kind);
        self.report_as(fault, tag, disposition)
    }

    /// Reports a fault with an explicit disposition.
    ///
    /// InvariantBreach is raised regardless of `disposition`.
    pub fn report_as(
        &self,
        fault: Fault,
        tag: &str,
        disposition: Disposition,
    ) -> Result<(), HierarchyError> {
        let disposition = if fault.kind == FailureKind::InvariantBreach {
            Disposition::Error
        } else {
            disposition
        };

        let record = DiagnosticRecord {
            timestamp: Utc::now(),
            category: self.category.name().to_string(),
            kind: fault.kind,
            operation: fault.operation.to_string(),
            id: fault.id,
            parent: fault.parent,
            zone: fault.zone,
            description: fault.description,
            tag: tag.to_string(),
        };

        self.category
            .log(disposition.severity(), record.to_string(), record.fields());

        if disposition.is_soft() {
            return Ok(());
        }

        let record = Box::new(record);
        Err(match record.kind {
            FailureKind::DuplicateRegistration => HierarchyError::DuplicateRegistration(record),
            FailureKind::MissingId => HierarchyError::MissingId(record),
            FailureKind::MissingParent => HierarchyError::MissingParent(record),
            FailureKind::MissingZone => HierarchyError::MissingZone(record),
            FailureKind::NotInCell => HierarchyError::NotInCell(record),
            FailureKind::InvariantBreach => HierarchyError::InvariantBreach(record),
            FailureKind::Misuse => HierarchyError::Misuse(record),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;

    fn channel(overrides: &[(FailureKind, Disposition)]) -> (Logger, DiagnosticsChannel) {
        let logger = Logger::new(Severity::Debug, 32);
        let overrides = overrides.iter().copied().collect();
        let channel = DiagnosticsChannel::new(logger.category("DoHierarchy"), &overrides);
        (logger, channel)
    }

    fn missing_id() -> Fault {
        Fault::new(FailureKind::MissingId, "delete", "not registered")
            .with_id(DoId(9))
            .at(Location::new(100u64, 2u32))
    }

    #[test]
    fn test_error_disposition_raises_with_record() {
        let (logger, channel) = channel(&[]);
        let err = channel.report(missing_id(), "DistributedNPC").unwrap_err();

        let record = err.record().expect("hard failures carry a record");
        assert_eq!(record.kind, FailureKind::MissingId);
        assert_eq!(record.category, "DoHierarchy");
        assert_eq!(record.operation, "delete");
        assert_eq!(record.id, Some(DoId(9)));
        assert_eq!(record.parent, Some(DoId(100)));
        assert_eq!(record.zone, Some(ZoneId(2)));
        assert_eq!(record.tag, "DistributedNPC");

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert_eq!(records[0].field("id"), Some("9"));
        assert_eq!(records[0].field("kind"), Some("MissingId"));
    }

    #[test]
    fn test_soft_dispositions_continue() {
        let (logger, channel) = channel(&[(FailureKind::MissingId, Disposition::Warn)]);
        assert!(channel.report(missing_id(), "").is_ok());
        assert!(channel
            .report_as(missing_id(), "", Disposition::Trace)
            .is_ok());

        let severities: Vec<_> = logger.records().iter().map(|r| r.severity).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Debug]);
    }

    #[test]
    fn test_invariant_breach_cannot_be_softened() {
        let (_logger, mut channel) = channel(&[(FailureKind::InvariantBreach, Disposition::Trace)]);
        assert_eq!(channel.disposition(FailureKind::InvariantBreach), Disposition::Error);

        channel.set_disposition(FailureKind::InvariantBreach, Disposition::Warn);
        let fault = Fault::new(FailureKind::InvariantBreach, "is_empty", "views disagree");
        let err = channel.report_as(fault, "", Disposition::Trace).unwrap_err();
        assert!(matches!(err, HierarchyError::InvariantBreach(_)));
    }

    #[test]
    fn test_record_display() {
        let (_logger, channel) = channel(&[]);
        let err = channel.report(missing_id(), "DistributedNPC").unwrap_err();
        assert_eq!(
            err.record().unwrap().to_string(),
            "[DoHierarchy] delete(DistributedNPC 9) @ (100, 2): not registered"
        );
    }

    #[test]
    fn test_failure_kind_serde_names() {
        let json = serde_json::to_string(&FailureKind::Misuse).unwrap();
        assert_eq!(json, "\"MisuseError\"");
        let kind: FailureKind = serde_json::from_str("\"Misuse\"").unwrap();
        assert_eq!(kind, FailureKind::Misuse);
        let disposition: Disposition = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(disposition, Disposition::Warn);
    }
}
