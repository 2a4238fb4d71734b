//! reveille alarm daemon
//!
//! Library side of the `reveille-alarmd` binary, exposed so the daemon can be
//! driven from integration tests.

pub mod alarm_clock;
pub mod application;
pub mod config;
pub mod error;

pub use alarm_clock::{next_ring_at, AlarmClock, AlarmEvent, AlarmTime};
pub use application::{
    AlarmSettings, Application, RingOutcome, ALARM_ENABLED_KEY, ALARM_STATION_KEY, ALARM_TIME_KEY,
};
pub use config::Config;
pub use error::{AppError, AppResult, ErrorSeverity};
