//! # Hierarchy API
//!
//! [`DoHierarchy`] is the surface the rest of the process uses. It wraps the
//! [`LocationTable`] and sends every fault through the [`DiagnosticsChannel`]:
//! soft dispositions leave the table untouched and return the no-op result,
//! hard dispositions return a [`HierarchyError`] carrying the written record.
//!
//! An InvariantBreach poisons the hierarchy. Every later call fails fast with
//! [`HierarchyError::Poisoned`] until [`DoHierarchy::clear`] is invoked.
//!
//! ## Example
//!
//! ```rust
//! use do_hierarchy::{DoHierarchy, DoId, ZoneId};
//!
//! let mut hierarchy = DoHierarchy::new();
//! hierarchy.store(DoId(42), DoId(100), ZoneId(2), "DistributedToon")?;
//! assert_eq!(hierarchy.query(DoId(100), Some(ZoneId(2)))?, vec![DoId(42)]);
//!
//! hierarchy.delete(DoId(42), DoId(100), ZoneId(2), "DistributedToon")?;
//! assert!(hierarchy.is_empty()?);
//! # Ok::<(), do_hierarchy::HierarchyError>(())
//! ```

use crate::config::HierarchyConfig;
use crate::diagnostics::{DiagnosticsChannel, Disposition, FailureKind, Fault};
use crate::error::{ConfigError, HierarchyError};
use crate::logging::Logger;
use crate::object::{is_of_class, DistributedObject, ObjectResolver, QueryOptions};
use crate::table::{HierarchySnapshot, LocationTable};
use crate::types::{DoId, Location, ZoneId};

/// Parent/zone registry of live distributed objects.
#[derive(Debug)]
pub struct DoHierarchy {
    table: LocationTable,
    channel: DiagnosticsChannel,
    logger: Logger,
    tolerate_missing_on_delete: bool,
    relocate_on_duplicate: bool,
    poisoned: bool,
}

impl Default for DoHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl DoHierarchy {
    /// Creates a strict hierarchy with default dispositions.
    pub fn new() -> Self {
        let config = HierarchyConfig::default();
        let logger = Logger::from_settings(&config.logging);
        Self::assemble(&config, logger, Default::default())
    }

    /// Creates a hierarchy from configuration, with its own logger.
    ///
    /// # Arguments
    ///
    /// * `config` - Dispositions, tolerance knobs and logging settings
    ///
    /// # Returns
    ///
    /// The hierarchy, or [`ConfigError::Invalid`] if `config` fails
    /// [`HierarchyConfig::validate`].
    pub fn with_config(config: &HierarchyConfig) -> Result<Self, ConfigError> {
        Self::with_logger(config, Logger::from_settings(&config.logging))
    }

    /// Creates a hierarchy that writes into an existing logger.
    pub fn with_logger(config: &HierarchyConfig, logger: Logger) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let overrides = config.dispositions()?;
        Ok(Self::assemble(config, logger, overrides))
    }

    fn assemble(
        config: &HierarchyConfig,
        logger: Logger,
        overrides: std::collections::HashMap<FailureKind, Disposition>,
    ) -> Self {
        let category = logger.category(&config.logger_category);
        Self {
            table: LocationTable::new(category.clone()),
            channel: DiagnosticsChannel::new(category, &overrides),
            logger,
            tolerate_missing_on_delete: config.tolerate_missing_on_delete,
            relocate_on_duplicate: config.relocate_on_duplicate,
            poisoned: false,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Registers `id` under `(parent, zone)`.
    ///
    /// # Arguments
    ///
    /// * `id` - Object to register
    /// * `parent` - Containing object
    /// * `zone` - Interest zone under `parent`
    /// * `tag` - Short type name used in log records only
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the table was changed, `Ok(false)` when a soft
    /// DuplicateRegistration left it untouched, or the hard failure.
    pub fn store(
        &mut self,
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        tag: &str,
    ) -> Result<bool, HierarchyError> {
        self.ensure_healthy()?;
        let location = Location { parent, zone };

        let Err(fault) = self.table.store(id, location, tag) else {
            return Ok(true);
        };
        self.report(fault, tag)?;

        // Only reached when DuplicateRegistration is soft.
        if self.relocate_on_duplicate {
            return Ok(self.table.restore(id, location).is_some());
        }
        Ok(false)
    }

    /// Removes `id` from `(parent, zone)`.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the id was removed, `Ok(false)` when a soft failure
    /// (or a tolerated unknown id) left the table untouched, or the hard
    /// failure.
    pub fn delete(
        &mut self,
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        tag: &str,
    ) -> Result<bool, HierarchyError> {
        self.ensure_healthy()?;

        let Err(fault) = self.table.delete(id, Location { parent, zone }, tag) else {
            return Ok(true);
        };
        if fault.kind == FailureKind::MissingId && self.tolerate_missing_on_delete {
            self.channel.report_as(fault, tag, Disposition::Trace)?;
            return Ok(false);
        }
        self.report(fault, tag)?;
        Ok(false)
    }

    /// Drops all state and lifts a poisoned hierarchy.
    pub fn clear(&mut self) {
        self.table.clear();
        self.poisoned = false;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Ids under `parent`; `zone = None` spans every zone. Unordered.
    ///
    /// An unknown parent yields an empty result.
    pub fn query(&self, parent: DoId, zone: Option<ZoneId>) -> Result<Vec<DoId>, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.ids(parent, zone))
    }

    /// Ids under `parent` whose resolved objects pass `options.filter`.
    ///
    /// A filter without a resolver is reported as MisuseError; when that kind
    /// is soft the result is empty.
    pub fn query_with(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
        options: QueryOptions<'_>,
    ) -> Result<Vec<DoId>, HierarchyError> {
        self.ensure_healthy()?;
        match self.table.query(parent, zone, options) {
            Ok(ids) => Ok(ids),
            Err(fault) => {
                self.channel.report(fault, "")?;
                Ok(Vec::new())
            }
        }
    }

    /// Ids under `parent` whose resolved objects are of class `T`.
    pub fn query_with_class<T: DistributedObject>(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
        resolver: &dyn ObjectResolver,
    ) -> Result<Vec<DoId>, HierarchyError> {
        let filter = |object: &dyn DistributedObject| is_of_class::<T>(object);
        self.query_with(
            parent,
            zone,
            QueryOptions::new().filter(&filter).resolver(resolver),
        )
    }

    /// Number of ids `query(parent, zone)` would return.
    pub fn count(&self, parent: DoId, zone: Option<ZoneId>) -> Result<usize, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.count(parent, zone))
    }

    /// Number of registered ids.
    pub fn size(&self) -> Result<usize, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.len())
    }

    /// True when nothing is registered. Cross-checks the index against the
    /// membership set; a mismatch poisons the hierarchy.
    pub fn is_empty(&mut self) -> Result<bool, HierarchyError> {
        self.ensure_healthy()?;
        match self.table.is_empty() {
            Ok(empty) => Ok(empty),
            Err(fault) => {
                self.report(fault, "")?;
                Ok(false)
            }
        }
    }

    /// Whether `id` is registered anywhere.
    ///
    /// Answers from the membership set without walking the index, so it is
    /// the cheap existence check callers should prefer over `query`.
    pub fn contains(&self, id: DoId) -> Result<bool, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.contains(id))
    }

    /// Parents currently holding children. Unordered.
    pub fn parents(&self) -> Result<Vec<DoId>, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.parents())
    }

    /// Zones under `parent` currently holding children. Unordered.
    pub fn zones(&self, parent: DoId) -> Result<Vec<ZoneId>, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.zones(parent))
    }

    /// Full consistency check of the index; a failure poisons the hierarchy.
    pub fn check_invariants(&mut self) -> Result<(), HierarchyError> {
        self.ensure_healthy()?;
        match self.table.check_invariants() {
            Ok(()) => Ok(()),
            Err(fault) => self.report(fault, ""),
        }
    }

    /// Ordered copy of the whole table.
    ///
    /// # Returns
    ///
    /// A [`HierarchySnapshot`] with parents, zones and ids sorted, suitable
    /// for serialisation and comparison. The copy is owned by the caller and
    /// does not track later mutations.
    pub fn snapshot(&self) -> Result<HierarchySnapshot, HierarchyError> {
        self.ensure_healthy()?;
        Ok(self.table.snapshot())
    }

    // ========================================================================
    // Configuration and diagnostics
    // ========================================================================

    /// True after an InvariantBreach until the next [`DoHierarchy::clear`].
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The logger shared by the table, the channel and any adapter built on
    /// top of this hierarchy.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn diagnostics(&self) -> &DiagnosticsChannel {
        &self.channel
    }

    /// Changes how a failure kind is handled from the next call on.
    ///
    /// # Arguments
    ///
    /// * `kind` - Failure kind to reconfigure
    /// * `disposition` - `Trace` or `Warn` let the call continue as a no-op,
    ///   `Error` makes it fail
    ///
    /// InvariantBreach ignores anything but `Error`; the attempt is logged as
    /// a warning. Registered ids and the log history are unaffected.
    pub fn set_disposition(&mut self, kind: FailureKind, disposition: Disposition) {
        self.channel.set_disposition(kind, disposition);
    }

    /// Whether deleting an unknown id is downgraded to a debug trace.
    pub fn tolerate_missing_on_delete(&self) -> bool {
        self.tolerate_missing_on_delete
    }

    pub fn set_tolerate_missing_on_delete(&mut self, tolerate: bool) {
        self.tolerate_missing_on_delete = tolerate;
    }

    /// When set, a soft DuplicateRegistration moves the id to the requested
    /// cell. Has no effect while DuplicateRegistration is an error.
    pub fn set_relocate_on_duplicate(&mut self, relocate: bool) {
        self.relocate_on_duplicate = relocate;
    }

    fn ensure_healthy(&self) -> Result<(), HierarchyError> {
        if self.poisoned {
            return Err(HierarchyError::Poisoned);
        }
        Ok(())
    }

    fn report(&mut self, fault: Fault, tag: &str) -> Result<(), HierarchyError> {
        if fault.kind == FailureKind::InvariantBreach {
            self.poisoned = true;
        }
        self.channel.report(fault, tag)
    }

    #[cfg(test)]
    pub(crate) fn table_mut(&mut self) -> &mut LocationTable {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Severity;

    fn hierarchy() -> DoHierarchy {
        let mut config = HierarchyConfig::default();
        config.logging.level = "debug".to_string();
        DoHierarchy::with_config(&config).unwrap()
    }

    #[test]
    fn test_duplicate_store_reports_once_and_keeps_table() {
        let mut h = hierarchy();
        h.store(DoId(9), DoId(100), ZoneId(2), "Npc").unwrap();
        h.logger().drain();

        let err = h.store(DoId(9), DoId(200), ZoneId(5), "Npc").unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateRegistration(_)));

        let records = h.logger().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Error);
        assert_eq!(h.query(DoId(100), Some(ZoneId(2))).unwrap(), vec![DoId(9)]);
        assert!(h.query(DoId(200), None).unwrap().is_empty());
    }

    #[test]
    fn test_soft_duplicate_with_relocation() {
        let mut h = hierarchy();
        h.set_disposition(FailureKind::DuplicateRegistration, Disposition::Warn);
        h.set_relocate_on_duplicate(true);

        h.store(DoId(9), DoId(100), ZoneId(2), "").unwrap();
        h.store(DoId(9), DoId(200), ZoneId(5), "").unwrap();

        assert_eq!(h.size().unwrap(), 1);
        assert_eq!(h.query(DoId(200), Some(ZoneId(5))).unwrap(), vec![DoId(9)]);
        assert_eq!(h.parents().unwrap(), vec![DoId(200)]);
        h.check_invariants().unwrap();
    }

    #[test]
    fn test_relocate_on_duplicate_ignored_when_hard() {
        let mut h = hierarchy();
        h.set_relocate_on_duplicate(true);
        h.store(DoId(9), DoId(100), ZoneId(2), "").unwrap();

        assert!(h.store(DoId(9), DoId(200), ZoneId(5), "").is_err());
        assert_eq!(h.query(DoId(100), Some(ZoneId(2))).unwrap(), vec![DoId(9)]);
    }

    #[test]
    fn test_soft_delete_failure_leaves_table_unchanged() {
        let mut h = hierarchy();
        h.set_disposition(FailureKind::NotInCell, Disposition::Warn);
        h.store(DoId(1), DoId(100), ZoneId(2), "").unwrap();
        h.store(DoId(2), DoId(100), ZoneId(3), "").unwrap();

        assert!(h.delete(DoId(1), DoId(100), ZoneId(3), "").is_ok());
        assert_eq!(h.size().unwrap(), 2);
        assert_eq!(h.query(DoId(100), Some(ZoneId(2))).unwrap(), vec![DoId(1)]);
    }

    #[test]
    fn test_invariant_breach_poisons_until_clear() {
        let mut h = hierarchy();
        h.table_mut().register_without_cell(DoId(3));

        let err = h.is_empty().unwrap_err();
        assert!(matches!(err, HierarchyError::InvariantBreach(_)));
        assert!(h.is_poisoned());

        assert!(matches!(
            h.store(DoId(4), DoId(100), ZoneId(2), ""),
            Err(HierarchyError::Poisoned)
        ));
        assert!(matches!(h.query(DoId(100), None), Err(HierarchyError::Poisoned)));
        assert!(matches!(h.size(), Err(HierarchyError::Poisoned)));

        h.clear();
        assert!(!h.is_poisoned());
        assert!(h.is_empty().unwrap());
        h.store(DoId(4), DoId(100), ZoneId(2), "").unwrap();
    }

    #[test]
    fn test_soft_misuse_returns_empty() {
        let mut h = hierarchy();
        h.set_disposition(FailureKind::Misuse, Disposition::Warn);
        h.store(DoId(1), DoId(100), ZoneId(2), "").unwrap();

        let filter = |_: &dyn DistributedObject| true;
        let ids = h
            .query_with(DoId(100), Some(ZoneId(2)), QueryOptions::new().filter(&filter))
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_hard_misuse_raises() {
        let h = hierarchy();
        let filter = |_: &dyn DistributedObject| true;
        let err = h
            .query_with(DoId(100), None, QueryOptions::new().filter(&filter))
            .unwrap_err();
        assert!(matches!(err, HierarchyError::Misuse(_)));
    }

    #[test]
    fn test_clear_emits_single_debug_trace() {
        let mut h = hierarchy();
        h.store(DoId(1), DoId(100), ZoneId(2), "").unwrap();
        h.logger().drain();

        h.clear();
        let records = h.logger().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Debug);
        assert_eq!(h.size().unwrap(), 0);
    }

    #[test]
    fn test_mutations_report_whether_they_applied() {
        let mut h = hierarchy();
        h.set_disposition(FailureKind::DuplicateRegistration, Disposition::Trace);
        h.set_disposition(FailureKind::NotInCell, Disposition::Warn);

        assert!(h.store(DoId(1), DoId(100), ZoneId(2), "").unwrap());
        assert!(h.store(DoId(2), DoId(100), ZoneId(3), "").unwrap());
        assert!(!h.store(DoId(1), DoId(100), ZoneId(2), "").unwrap());
        assert!(!h.delete(DoId(1), DoId(100), ZoneId(3), "").unwrap());
        assert!(h.delete(DoId(1), DoId(100), ZoneId(2), "").unwrap());
        assert_eq!(h.size().unwrap(), 1);
    }

    #[test]
    fn test_tolerance_can_be_toggled_at_runtime() {
        let mut h = hierarchy();
        assert!(!h.tolerate_missing_on_delete());
        assert!(h.delete(DoId(5), DoId(100), ZoneId(2), "").is_err());

        h.set_tolerate_missing_on_delete(true);
        assert!(h.tolerate_missing_on_delete());
        h.logger().drain();
        assert!(!h.delete(DoId(5), DoId(100), ZoneId(2), "").unwrap());

        let records = h.logger().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Debug);
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = HierarchyConfig::default();
        config
            .diagnostics
            .insert("InvariantBreach".to_string(), Disposition::Trace);
        assert!(matches!(
            DoHierarchy::with_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
