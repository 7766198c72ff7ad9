//! Test modules for the hierarchy registry
//!
//! - End-to-end scenarios against the public API
//! - Property tests against a reference model of (id, parent, zone) triples
//! - Dispatcher adapter lifecycle tests

mod property_test;
