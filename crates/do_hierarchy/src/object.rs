//! Live object handles and the resolver seam.
//!
//! The table stores ids only. Filtered queries reach the live objects through
//! an [`ObjectResolver`] supplied by the caller for the duration of the call;
//! handles are never cached by the registry.

use crate::types::{DoId, ZoneId};
use std::any::Any;
use std::sync::Arc;

/// A replicated object known to the process, as seen by the registry.
pub trait DistributedObject: Send + Sync + Any + std::fmt::Debug {
    /// Identifier of this object
    fn do_id(&self) -> DoId;

    /// Short distributed-class name, used as the caller tag in diagnostics
    fn dclass_name(&self) -> &str;

    /// Get the object as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// A child was placed under this object in `zone`.
    fn handle_child_arrive(&self, child: DoId, zone: ZoneId) {
        let _ = (child, zone);
    }

    /// A child moved into `zone` without changing parent.
    fn handle_child_arrive_zone(&self, child: DoId, zone: ZoneId) {
        let _ = (child, zone);
    }

    /// A child left this object from `zone`.
    fn handle_child_leave(&self, child: DoId, zone: ZoneId) {
        let _ = (child, zone);
    }

    /// A child moved out of `zone` without changing parent.
    fn handle_child_leave_zone(&self, child: DoId, zone: ZoneId) {
        let _ = (child, zone);
    }
}

/// Shared handle to a live object.
pub type ObjectHandle = Arc<dyn DistributedObject>;

/// Maps an id to its live object. `None` means "unknown id".
pub trait ObjectResolver {
    fn resolve(&self, id: DoId) -> Option<ObjectHandle>;
}

impl<F> ObjectResolver for F
where
    F: Fn(DoId) -> Option<ObjectHandle>,
{
    fn resolve(&self, id: DoId) -> Option<ObjectHandle> {
        self(id)
    }
}

/// Predicate applied to resolved objects in filtered queries.
pub type ObjectFilter<'a> = &'a dyn Fn(&dyn DistributedObject) -> bool;

/// Returns true when `object` is a `T`.
pub fn is_of_class<T: DistributedObject>(object: &dyn DistributedObject) -> bool {
    object.as_any().is::<T>()
}

/// Optional filter and resolver for a query.
///
/// A filter without a resolver is a misuse and is reported as such.
#[derive(Clone, Copy, Default)]
pub struct QueryOptions<'a> {
    pub filter: Option<ObjectFilter<'a>>,
    pub resolver: Option<&'a dyn ObjectResolver>,
}

impl<'a> QueryOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: ObjectFilter<'a>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn resolver(mut self, resolver: &'a dyn ObjectResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl std::fmt::Debug for QueryOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("filter", &self.filter.is_some())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}
