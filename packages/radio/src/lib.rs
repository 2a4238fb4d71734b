//! Radio stations and playback for reveille
//!
//! - [`StationRegistry`] - validated in-memory catalog of stations
//! - [`Radio`] - plays, stops and fades in the selected station through a
//!   pooled MPD connection

mod error;
mod radio;
mod registry;
mod station;

pub use error::{RadioError, RadioResult, RegistryError, RegistryResult, ValidationError};
pub use radio::{fade_step, FadeOutcome, Radio, MIN_FADE_DURATION};
pub use registry::StationRegistry;
pub use station::{Station, StationDraft, STATION_KEYS};
