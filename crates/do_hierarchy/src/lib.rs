//! # Distributed-Object Hierarchy Registry
//!
//! Bookkeeping for every live distributed object in a replicated world,
//! indexed by parent id and interest zone. The registry sits on the hot path
//! of world replication: each object generate, relocation and delete observed
//! by the network dispatcher lands here, and interest management queries it
//! per zone.
//!
//! ## Layers
//!
//! * [`logging`] - named-category logger backed by `tracing`
//! * [`diagnostics`] - per failure-kind dispositions (trace / warn / error)
//! * [`table`] - the parent → zone → ids index and its invariants
//! * [`hierarchy`] - the public API with fail-fast poisoning
//! * [`dispatcher`] - lifecycle event bridge, resolver and zone policy
//!
//! ## Concurrency
//!
//! The registry is single-threaded. Callers sharing a [`DoHierarchy`] across
//! threads wrap it in their own mutex; nothing inside locks.

pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod object;
pub mod table;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{HierarchyConfig, LoggingSettings, ZonePolicySettings, DEFAULT_LOGGER_CATEGORY};
pub use diagnostics::{DiagnosticRecord, DiagnosticsChannel, Disposition, FailureKind, Fault};
pub use dispatcher::{DispatcherAdapter, LifecycleEvent, ZonePolicy, DISPATCHER_CATEGORY};
pub use error::{ConfigError, HierarchyError};
pub use hierarchy::DoHierarchy;
pub use logging::{LogCategory, LogRecord, Logger, Severity};
pub use object::{is_of_class, DistributedObject, ObjectFilter, ObjectHandle, ObjectResolver, QueryOptions};
pub use table::{HierarchySnapshot, LocationTable};
pub use types::{DoId, Location, ZoneId};
