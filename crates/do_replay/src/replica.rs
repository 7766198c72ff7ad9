//! Stand-in live objects for replayed ids.
//!
//! Every generated id gets a [`ReplicaObject`] so parents can be resolved and
//! notified while the stream is replayed.

use dashmap::DashMap;
use do_hierarchy::{DistributedObject, DoId, ObjectHandle, ObjectResolver, ZoneId};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A replayed object. Counts the children currently placed under it.
#[derive(Debug)]
pub struct ReplicaObject {
    id: DoId,
    dclass: String,
    children: AtomicUsize,
}

impl ReplicaObject {
    pub fn new(id: DoId, dclass: impl Into<String>) -> Self {
        Self {
            id,
            dclass: dclass.into(),
            children: AtomicUsize::new(0),
        }
    }

    pub fn child_count(&self) -> usize {
        self.children.load(Ordering::Relaxed)
    }
}

impl DistributedObject for ReplicaObject {
    fn do_id(&self) -> DoId {
        self.id
    }

    fn dclass_name(&self) -> &str {
        &self.dclass
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn handle_child_arrive(&self, _child: DoId, _zone: ZoneId) {
        self.children.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_child_leave(&self, _child: DoId, _zone: ZoneId) {
        // saturating: a parent generated after its children never saw them arrive
        let _ = self
            .children
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

/// Shared id → replica map. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ReplicaRegistry {
    objects: Arc<DashMap<DoId, Arc<ReplicaObject>>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica for `id`, keeping an existing one.
    pub fn spawn(&self, id: DoId, dclass: &str) -> Arc<ReplicaObject> {
        self.objects
            .entry(id)
            .or_insert_with(|| Arc::new(ReplicaObject::new(id, dclass)))
            .value()
            .clone()
    }

    pub fn despawn(&self, id: DoId) -> Option<Arc<ReplicaObject>> {
        self.objects.remove(&id).map(|(_, object)| object)
    }

    pub fn get(&self, id: DoId) -> Option<Arc<ReplicaObject>> {
        self.objects.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectResolver for ReplicaRegistry {
    fn resolve(&self, id: DoId) -> Option<ObjectHandle> {
        self.get(id).map(|object| object as ObjectHandle)
    }
}
