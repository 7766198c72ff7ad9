//! # Location Table
//!
//! The indexed store behind the hierarchy API: parent → zone → set of ids,
//! plus a flat membership set that is the authoritative existence oracle.
//!
//! Invariants held after every mutation:
//!
//! - every registered id sits in exactly one `(parent, zone)` cell
//! - every id in a cell is registered
//! - empty cells and parents with no zones are pruned
//! - the membership size equals the sum of all cell sizes
//!
//! Mutations return a [`Fault`] instead of touching the table when their
//! precondition fails. Routing faults to the diagnostics channel is the job
//! of [`crate::hierarchy::DoHierarchy`].

use crate::diagnostics::{FailureKind, Fault};
use crate::logging::{LogCategory, Severity};
use crate::object::QueryOptions;
use crate::types::{DoId, Location, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

type ZoneMap = HashMap<ZoneId, HashSet<DoId>>;

/// Ordered, serialisable copy of the table contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub parents: BTreeMap<DoId, BTreeMap<ZoneId, Vec<DoId>>>,
}

impl HierarchySnapshot {
    /// Total number of ids across all cells.
    pub fn len(&self) -> usize {
        self.parents
            .values()
            .flat_map(|zones| zones.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Parent/zone index of registered object ids.
#[derive(Debug)]
pub struct LocationTable {
    parent_index: HashMap<DoId, ZoneMap>,
    membership: HashSet<DoId>,
    log: LogCategory,
}

impl LocationTable {
    /// Creates an empty table writing its debug traces to `log`.
    pub fn new(log: LogCategory) -> Self {
        Self {
            parent_index: HashMap::new(),
            membership: HashSet::new(),
            log,
        }
    }

    /// Registers `id` in the cell `location`.
    ///
    /// # Arguments
    ///
    /// * `id` - Object to register; must not be registered yet
    /// * `location` - Target cell, created on demand
    /// * `tag` - Type name for the debug trace; never stored
    ///
    /// # Returns
    ///
    /// `Ok(())` after the insert, or a DuplicateRegistration [`Fault`] with
    /// the table unchanged.
    pub fn store(&mut self, id: DoId, location: Location, tag: &str) -> Result<(), Fault> {
        if self.membership.contains(&id) {
            return Err(Fault::new(
                FailureKind::DuplicateRegistration,
                "store",
                "id is already registered; duplicate generate, or the previous instance was never cleaned up",
            )
            .with_id(id)
            .at(location));
        }

        self.insert(id, location);
        self.trace("store", id, location, tag);
        Ok(())
    }

    /// Moves an already registered `id` to `location`.
    ///
    /// Used for tolerated duplicate registrations, whose report is the only
    /// record of the move. Returns the previous cell.
    pub fn restore(&mut self, id: DoId, location: Location) -> Option<Location> {
        let previous = self.locate(id)?;
        self.remove(id, previous);
        self.insert(id, location);
        Some(previous)
    }

    /// Removes `id` from the cell `location`, pruning empty keys.
    ///
    /// Preconditions are checked in order: MissingId, MissingParent,
    /// MissingZone, NotInCell. The first failing check is returned and the
    /// table is left unchanged.
    pub fn delete(&mut self, id: DoId, location: Location, tag: &str) -> Result<(), Fault> {
        if !self.membership.contains(&id) {
            return Err(Fault::new(
                FailureKind::MissingId,
                "delete",
                "id is not registered; duplicate delete, or an invalid previous location",
            )
            .with_id(id)
            .at(location));
        }

        let Some(zones) = self.parent_index.get(&location.parent) else {
            return Err(Fault::new(FailureKind::MissingParent, "delete", "parent not found")
                .with_id(id)
                .at(location));
        };
        let Some(cell) = zones.get(&location.zone) else {
            return Err(Fault::new(FailureKind::MissingZone, "delete", "zone not found under parent")
                .with_id(id)
                .at(location));
        };
        if !cell.contains(&id) {
            let actual = self
                .locate(id)
                .map(|actual| format!("id not in cell; registered at {actual}"))
                .unwrap_or_else(|| "id not in cell".to_string());
            return Err(Fault::new(FailureKind::NotInCell, "delete", actual)
                .with_id(id)
                .at(location));
        }

        self.remove(id, location);
        self.trace("delete", id, location, tag);
        Ok(())
    }

    /// Ids under `parent`, in one zone or across all of them. Unordered.
    pub fn ids(&self, parent: DoId, zone: Option<ZoneId>) -> Vec<DoId> {
        let Some(zones) = self.parent_index.get(&parent) else {
            return Vec::new();
        };
        match zone {
            Some(zone) => zones
                .get(&zone)
                .map(|cell| cell.iter().copied().collect())
                .unwrap_or_default(),
            None => zones.values().flat_map(|cell| cell.iter().copied()).collect(),
        }
    }

    /// Ids under `parent`, optionally narrowed by a filter over resolved objects.
    pub fn query(
        &self,
        parent: DoId,
        zone: Option<ZoneId>,
        options: QueryOptions<'_>,
    ) -> Result<Vec<DoId>, Fault> {
        let Some(filter) = options.filter else {
            return Ok(self.ids(parent, zone));
        };
        let Some(resolver) = options.resolver else {
            let mut fault = Fault::new(
                FailureKind::Misuse,
                "query",
                "a filter was supplied without a resolver",
            )
            .with_parent(parent);
            fault.zone = zone;
            return Err(fault);
        };

        Ok(self
            .ids(parent, zone)
            .into_iter()
            .filter(|id| {
                resolver
                    .resolve(*id)
                    .is_some_and(|object| filter(object.as_ref()))
            })
            .collect())
    }

    /// Number of ids `ids(parent, zone)` would return.
    pub fn count(&self, parent: DoId, zone: Option<ZoneId>) -> usize {
        let Some(zones) = self.parent_index.get(&parent) else {
            return 0;
        };
        match zone {
            Some(zone) => zones.get(&zone).map_or(0, HashSet::len),
            None => zones.values().map(HashSet::len).sum(),
        }
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    /// Cross-checks both views before reporting emptiness.
    pub fn is_empty(&self) -> Result<bool, Fault> {
        let index_empty = self.parent_index.is_empty();
        let members_empty = self.membership.is_empty();
        if index_empty != members_empty {
            return Err(Fault::new(
                FailureKind::InvariantBreach,
                "is_empty",
                format!(
                    "parent index has {} parents but membership holds {} ids",
                    self.parent_index.len(),
                    self.membership.len()
                ),
            ));
        }
        Ok(index_empty)
    }

    pub fn contains(&self, id: DoId) -> bool {
        self.membership.contains(&id)
    }

    /// Parents that currently hold at least one child.
    pub fn parents(&self) -> Vec<DoId> {
        self.parent_index.keys().copied().collect()
    }

    /// Zones under `parent` that currently hold at least one child.
    pub fn zones(&self, parent: DoId) -> Vec<ZoneId> {
        self.parent_index
            .get(&parent)
            .map(|zones| zones.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Finds the cell holding `id`. Linear in the number of cells.
    pub fn locate(&self, id: DoId) -> Option<Location> {
        if !self.membership.contains(&id) {
            return None;
        }
        self.parent_index.iter().find_map(|(parent, zones)| {
            zones
                .iter()
                .find(|(_, cell)| cell.contains(&id))
                .map(|(zone, _)| Location::new(*parent, *zone))
        })
    }

    /// Drops every id. Emits a single debug record with the dropped count.
    pub fn clear(&mut self) {
        let dropped = self.membership.len();
        self.parent_index.clear();
        self.membership.clear();
        self.log.log(
            Severity::Debug,
            format!("clear: dropped {dropped} ids"),
            vec![("dropped".to_string(), dropped.to_string())],
        );
    }

    /// Full cross-check of the index against the membership set.
    pub fn check_invariants(&self) -> Result<(), Fault> {
        let breach = |description: String| {
            Fault::new(FailureKind::InvariantBreach, "check_invariants", description)
        };

        let mut seen: HashMap<DoId, Location> = HashMap::with_capacity(self.membership.len());
        for (parent, zones) in &self.parent_index {
            if zones.is_empty() {
                return Err(breach(format!("parent {parent} has no zones but was not pruned"))
                    .with_parent(*parent));
            }
            for (zone, cell) in zones {
                let here = Location::new(*parent, *zone);
                if cell.is_empty() {
                    return Err(breach(format!("cell {here} is empty but was not pruned")).at(here));
                }
                for id in cell {
                    if !self.membership.contains(id) {
                        return Err(breach(format!("id in cell {here} is not registered"))
                            .with_id(*id)
                            .at(here));
                    }
                    if let Some(other) = seen.insert(*id, here) {
                        return Err(breach(format!("id is stored in both {other} and {here}"))
                            .with_id(*id)
                            .at(here));
                    }
                }
            }
        }

        if seen.len() != self.membership.len() {
            let orphan = self.membership.iter().find(|id| !seen.contains_key(id));
            let mut fault = breach(format!(
                "membership holds {} ids but the index holds {}",
                self.membership.len(),
                seen.len()
            ));
            fault.id = orphan.copied();
            return Err(fault);
        }
        Ok(())
    }

    /// Sorted copy of the index.
    pub fn snapshot(&self) -> HierarchySnapshot {
        let parents = self
            .parent_index
            .iter()
            .map(|(parent, zones)| {
                let zones: BTreeMap<ZoneId, Vec<DoId>> = zones
                    .iter()
                    .map(|(zone, cell)| {
                        let mut ids: Vec<DoId> = cell.iter().copied().collect();
                        ids.sort_unstable();
                        (*zone, ids)
                    })
                    .collect();
                (*parent, zones)
            })
            .collect();
        HierarchySnapshot { parents }
    }

    fn insert(&mut self, id: DoId, location: Location) {
        self.parent_index
            .entry(location.parent)
            .or_default()
            .entry(location.zone)
            .or_default()
            .insert(id);
        self.membership.insert(id);
    }

    fn remove(&mut self, id: DoId, location: Location) {
        if let Some(zones) = self.parent_index.get_mut(&location.parent) {
            if let Some(cell) = zones.get_mut(&location.zone) {
                cell.remove(&id);
                if cell.is_empty() {
                    zones.remove(&location.zone);
                }
            }
            if zones.is_empty() {
                self.parent_index.remove(&location.parent);
            }
        }
        self.membership.remove(&id);
    }

    fn trace(&self, operation: &str, id: DoId, location: Location, tag: &str) {
        if !self.log.is_enabled(Severity::Debug) {
            return;
        }
        self.log.log(
            Severity::Debug,
            format!("{operation}: {tag}({id}) @ {location}"),
            vec![
                ("operation".to_string(), operation.to_string()),
                ("id".to_string(), id.to_string()),
                ("parent".to_string(), location.parent.to_string()),
                ("zone".to_string(), location.zone.to_string()),
                ("tag".to_string(), tag.to_string()),
            ],
        );
    }

    #[cfg(test)]
    pub(crate) fn register_without_cell(&mut self, id: DoId) {
        self.membership.insert(id);
    }
}
