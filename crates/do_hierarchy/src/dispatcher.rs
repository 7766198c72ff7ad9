//! # Dispatcher Adapter
//!
//! Bridges the network message dispatcher to the hierarchy. The dispatcher
//! reports three lifecycle events per object and the adapter turns them into
//! hierarchy mutations:
//!
//! - generate → `store`
//! - relocate → `delete` of the old cell, then `store` of the new one
//! - delete   → `delete`
//!
//! Objects at the null location (parent 0, zone 0) are never stored. Parents
//! that resolve to live objects are told when children arrive or leave.
//!
//! The adapter owns the resolver used by class-filtered queries and the
//! [`ZonePolicy`] callers consult before accepting player locations.

use crate::config::ZonePolicySettings;
use crate::error::HierarchyError;
use crate::hierarchy::DoHierarchy;
use crate::logging::LogCategory;
use crate::object::{DistributedObject, ObjectFilter, ObjectHandle, ObjectResolver, QueryOptions};
use crate::types::{DoId, Location, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Log category used for adapter-level records.
pub const DISPATCHER_CATEGORY: &str = "DoDispatcher";

/// Object lifecycle notification received from the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// An object was generated at `(parent, zone)`
    Generated {
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        #[serde(default)]
        dclass: String,
        /// Optional per-object fields; opaque to the registry
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<serde_json::Value>,
    },
    /// An object moved between cells
    Relocated {
        id: DoId,
        old_parent: DoId,
        old_zone: ZoneId,
        new_parent: DoId,
        new_zone: ZoneId,
        #[serde(default)]
        dclass: String,
    },
    /// An object was deleted from `(parent, zone)`
    Deleted {
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        #[serde(default)]
        dclass: String,
    },
}

impl LifecycleEvent {
    pub fn id(&self) -> DoId {
        match self {
            LifecycleEvent::Generated { id, .. }
            | LifecycleEvent::Relocated { id, .. }
            | LifecycleEvent::Deleted { id, .. } => *id,
        }
    }
}

/// Decides which zones are valid player locations.
///
/// Zones below the meta-zone threshold are reserved for bookkeeping, except
/// the explicitly allowed ones. Exempt parents accept every zone. The
/// hierarchy itself never consults this policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePolicy {
    meta_zone_threshold: u32,
    allowed_meta_zones: HashSet<ZoneId>,
    exempt_parents: HashSet<DoId>,
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self::from_settings(&ZonePolicySettings::default())
    }
}

impl ZonePolicy {
    pub fn from_settings(settings: &ZonePolicySettings) -> Self {
        Self {
            meta_zone_threshold: settings.meta_zone_threshold,
            allowed_meta_zones: settings.allowed_meta_zones.iter().copied().map(ZoneId).collect(),
            exempt_parents: settings.exempt_parents.iter().copied().map(DoId).collect(),
        }
    }

    pub fn meta_zone_threshold(&self) -> u32 {
        self.meta_zone_threshold
    }

    pub fn is_meta_zone(&self, zone: ZoneId) -> bool {
        zone.0 < self.meta_zone_threshold && !self.allowed_meta_zones.contains(&zone)
    }

    pub fn is_valid_player_location(&self, parent: DoId, zone: ZoneId) -> bool {
        self.exempt_parents.contains(&parent) || !self.is_meta_zone(zone)
    }
}

/// Feeds dispatcher lifecycle events into a [`DoHierarchy`].
pub struct DispatcherAdapter<R: ObjectResolver> {
    hierarchy: DoHierarchy,
    resolver: R,
    zone_policy: ZonePolicy,
    log: LogCategory,
}

impl<R: ObjectResolver> std::fmt::Debug for DispatcherAdapter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherAdapter")
            .field("hierarchy", &self.hierarchy)
            .field("zone_policy", &self.zone_policy)
            .finish_non_exhaustive()
    }
}

impl<R: ObjectResolver> DispatcherAdapter<R> {
    /// Creates an adapter with the default [`ZonePolicy`].
    ///
    /// # Arguments
    ///
    /// * `hierarchy` - Registry the lifecycle events are applied to
    /// * `resolver` - Maps ids to live objects for parent notifications and
    ///   class-filtered queries
    pub fn new(hierarchy: DoHierarchy, resolver: R) -> Self {
        Self::with_zone_policy(hierarchy, resolver, ZonePolicy::default())
    }

    pub fn with_zone_policy(hierarchy: DoHierarchy, resolver: R, zone_policy: ZonePolicy) -> Self {
        let log = hierarchy.logger().category(DISPATCHER_CATEGORY);
        Self {
            hierarchy,
            resolver,
            zone_policy,
            log,
        }
    }

    pub fn hierarchy(&self) -> &DoHierarchy {
        &self.hierarchy
    }

    pub fn hierarchy_mut(&mut self) -> &mut DoHierarchy {
        &mut self.hierarchy
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn zone_policy(&self) -> &ZonePolicy {
        &self.zone_policy
    }

    /// Whether a player may be placed at `(parent, zone)` under the adapter's
    /// zone policy. The hierarchy itself never consults this.
    pub fn is_valid_player_location(&self, parent: DoId, zone: ZoneId) -> bool {
        self.zone_policy.is_valid_player_location(parent, zone)
    }

    /// Applies one lifecycle event.
    ///
    /// # Returns
    ///
    /// `Ok(())` when the event was applied or tolerated, or the hard
    /// [`HierarchyError`] raised by the underlying `store` or `delete`.
    pub fn handle(&mut self, event: &LifecycleEvent) -> Result<(), HierarchyError> {
        match event {
            LifecycleEvent::Generated {
                id,
                parent,
                zone,
                dclass,
                ..
            } => self.on_object_generated(*id, *parent, *zone, dclass),
            LifecycleEvent::Relocated {
                id,
                old_parent,
                old_zone,
                new_parent,
                new_zone,
                dclass,
            } => self.on_object_relocated(
                *id,
                Location {
                    parent: *old_parent,
                    zone: *old_zone,
                },
                Location {
                    parent: *new_parent,
                    zone: *new_zone,
                },
                dclass,
            ),
            LifecycleEvent::Deleted {
                id,
                parent,
                zone,
                dclass,
            } => self.on_object_deleted(*id, *parent, *zone, dclass),
        }
    }

    /// An object was generated at `(parent, zone)`.
    ///
    /// `dclass` tags the log records; when empty the resolved object's class
    /// name is used.
    pub fn on_object_generated(
        &mut self,
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        dclass: &str,
    ) -> Result<(), HierarchyError> {
        let location = Location { parent, zone };
        let tag = self.tag_for(id, dclass);
        if location.is_null() {
            self.log
                .debug(format!("generate: {tag}({id}) at the null location; not stored"));
            return Ok(());
        }

        if self.hierarchy.store(id, parent, zone, &tag)? {
            self.notify_arrive(id, location);
        }
        Ok(())
    }

    /// An object moved from `old` to `new`.
    ///
    /// A soft failure of the delete does not prevent the store. A relocation
    /// to the current location is a no-op. Parents are only told about the
    /// steps that changed the table.
    pub fn on_object_relocated(
        &mut self,
        id: DoId,
        old: Location,
        new: Location,
        dclass: &str,
    ) -> Result<(), HierarchyError> {
        let tag = self.tag_for(id, dclass);
        if old == new {
            self.log
                .debug(format!("relocate: {tag}({id}) already at {new}"));
            return Ok(());
        }

        let mut removed = false;
        if !old.is_null() {
            removed = self.hierarchy.delete(id, old.parent, old.zone, &tag)?;
            if removed && old.parent != new.parent {
                self.with_parent(old.parent, |parent| parent.handle_child_leave(id, old.zone));
            } else if removed {
                self.with_parent(old.parent, |parent| parent.handle_child_leave_zone(id, old.zone));
            }
        }

        if new.is_null() {
            return Ok(());
        }
        if !self.hierarchy.store(id, new.parent, new.zone, &tag)? {
            return Ok(());
        }
        // A child that never left its parent only changed zone.
        if removed && old.parent == new.parent {
            self.with_parent(new.parent, |parent| parent.handle_child_arrive_zone(id, new.zone));
        } else {
            self.notify_arrive(id, new);
        }
        Ok(())
    }

    /// An object at `(parent, zone)` was deleted.
    pub fn on_object_deleted(
        &mut self,
        id: DoId,
        parent: DoId,
        zone: ZoneId,
        dclass: &str,
    ) -> Result<(), HierarchyError> {
        let location = Location { parent, zone };
        let tag = self.tag_for(id, dclass);
        if location.is_null() {
            self.log
                .debug(format!("delete: {tag}({id}) at the null location; nothing stored"));
            return Ok(());
        }

        if self.hierarchy.delete(id, parent, zone, &tag)? {
            self.with_parent(parent, |parent| parent.handle_child_leave(id, zone));
        }
        Ok(())
    }

    // ========================================================================
    // Resolved queries
    // ========================================================================

    /// Ids under `parent` whose objects pass `filter`, resolved through the
    /// adapter's resolver.
    pub fn query_filtered(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
        filter: ObjectFilter<'_>,
    ) -> Result<Vec<DoId>, HierarchyError> {
        self.hierarchy.query_with(
            parent,
            zone,
            QueryOptions::new().filter(filter).resolver(&self.resolver),
        )
    }

    /// Live objects under `parent`. Ids that do not resolve are skipped.
    pub fn objects_in_zone(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
    ) -> Result<Vec<(DoId, ObjectHandle)>, HierarchyError> {
        Ok(self
            .hierarchy
            .query(parent, zone)?
            .into_iter()
            .filter_map(|id| self.resolver.resolve(id).map(|object| (id, object)))
            .collect())
    }

    /// Ids under `parent` whose objects are of class `T`.
    pub fn objects_of_class<T: DistributedObject>(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
    ) -> Result<Vec<DoId>, HierarchyError> {
        self.hierarchy
            .query_with_class::<T>(parent, zone, &self.resolver)
    }

    /// Number of objects under `parent` of class `T`.
    pub fn count_of_class<T: DistributedObject>(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
    ) -> Result<usize, HierarchyError> {
        Ok(self.objects_of_class::<T>(parent, zone)?.len())
    }

    fn tag_for(&self, id: DoId, dclass: &str) -> String {
        if !dclass.is_empty() {
            return dclass.to_string();
        }
        self.resolver
            .resolve(id)
            .map(|object| object.dclass_name().to_string())
            .unwrap_or_default()
    }

    fn notify_arrive(&self, id: DoId, location: Location) {
        match self.resolver.resolve(location.parent) {
            Some(parent) => parent.handle_child_arrive(id, location.zone),
            None if !location.parent.is_null() => self.log.warning(format!(
                "object {id} placed under parent {} which is not present",
                location.parent
            )),
            None => {}
        }
    }

    fn with_parent(&self, parent: DoId, notify: impl FnOnce(&dyn DistributedObject)) {
        if let Some(parent) = self.resolver.resolve(parent) {
            notify(parent.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_zone_policy() {
        let policy = ZonePolicy::default();
        assert!(policy.is_valid_player_location(DoId(100), ZoneId(1)));
        assert!(policy.is_valid_player_location(DoId(100), ZoneId(1000)));
        assert!(policy.is_valid_player_location(DoId(100), ZoneId(2500)));
        assert!(!policy.is_valid_player_location(DoId(100), ZoneId(0)));
        assert!(!policy.is_valid_player_location(DoId(100), ZoneId(2)));
        assert!(!policy.is_valid_player_location(DoId(100), ZoneId(999)));
    }

    #[test]
    fn test_zone_policy_is_adjustable() {
        let policy = ZonePolicy::from_settings(&ZonePolicySettings {
            meta_zone_threshold: 10,
            allowed_meta_zones: vec![2],
            exempt_parents: vec![4000],
        });
        assert!(policy.is_valid_player_location(DoId(100), ZoneId(2)));
        assert!(!policy.is_valid_player_location(DoId(100), ZoneId(1)));
        assert!(policy.is_valid_player_location(DoId(100), ZoneId(10)));
        assert!(policy.is_valid_player_location(DoId(4000), ZoneId(1)));
    }

    #[test]
    fn test_lifecycle_event_json() {
        let event: LifecycleEvent = serde_json::from_str(
            r#"{"event":"relocated","id":5,"old_parent":100,"old_zone":2,"new_parent":200,"new_zone":7}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            LifecycleEvent::Relocated {
                id: DoId(5),
                old_parent: DoId(100),
                old_zone: ZoneId(2),
                new_parent: DoId(200),
                new_zone: ZoneId(7),
                dclass: String::new(),
            }
        );
        assert_eq!(event.id(), DoId(5));
    }
}
