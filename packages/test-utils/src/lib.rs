//! Shared test utilities for the reveille workspace
//!
//! This crate provides fakes of the two external services reveille talks to,
//! so the pool, the radio controller, the settings store and the alarm
//! daemon can be tested without a real MPD or CouchDB.
//!
//! # Mock Services
//!
//! - [`MockMpdServer`] - Fake MPD daemon on a local TCP port that records commands
//! - [`MockCouchServer`] - Stateful CouchDB document API with revision checks
//!
//! # Example
//!
//! ```rust,ignore
//! use reveille_test_utils::{MockCouchServer, MockMpdServer};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let mpd = MockMpdServer::start().await;
//!     let couch = MockCouchServer::start().await;
//!
//!     // Use mpd.host()/mpd.port() and couch.url() to configure your clients
//! }
//! ```

mod couchdb;
mod mpd;

pub use couchdb::MockCouchServer;
pub use mpd::{MockMpdServer, MOCK_MPD_VERSION};
