//! Radio error types

use reveille_mpd_client::{CommandError, ConnectionError};
use thiserror::Error;

/// Malformed station object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Every mandatory key that is absent or empty, in `id, name, url` order
    #[error("These keys are missed at station object: {}", quote_keys(.0))]
    MissingKeys(Vec<&'static str>),

    /// First mandatory field that is absent or empty, in `id, url, name` order
    #[error("\"{0}\" field is missed.")]
    MissingField(&'static str),

    /// A field that would split an MPD command line
    #[error("\"{0}\" field must not contain line breaks.")]
    LineBreak(&'static str),
}

fn quote_keys(keys: &[&str]) -> String {
    keys.iter()
        .map(|key| format!("\"{key}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Station catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Station \"{0}\" already exists.")]
    AlreadyExists(String),
}

/// Playback controller errors
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("You should choose a station before play it.")]
    NoStationSelected,

    #[error("Duration must be greater than or equal to {}", crate::radio::MIN_FADE_DURATION.as_millis())]
    FadeTooShort,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No connection to the daemon could be obtained
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The daemon rejected a command; displays the daemon's message as is
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for playback operations
pub type RadioResult<T> = Result<T, RadioError>;
