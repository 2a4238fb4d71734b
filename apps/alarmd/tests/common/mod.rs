//! Common test utilities for alarm daemon integration tests
//!
//! Builds an [`Application`] wired to a fake MPD daemon and a mock CouchDB.

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
