//! Error handling for the alarm daemon
//!
//! Wraps the errors of the radio, the station catalog and the settings store
//! and assigns each a severity so callers can log failures at the right level.

use reveille_radio::{RadioError, RegistryError, ValidationError};
use reveille_settings_client::SettingsError;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// `run` was called twice
    #[error("The application is already running.")]
    AlreadyRunning,

    /// The requested station is not in the catalog
    #[error("Station is not found")]
    StationNotFound(String),

    /// Alarm settings failed validation; displays the reason
    #[error("{0}")]
    InvalidSettings(String),

    /// Playback failed
    #[error(transparent)]
    Radio(#[from] RadioError),

    /// Station catalog rejected an operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Settings could not be read or written
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Radio(RadioError::Validation(err))
    }
}

impl AppError {
    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Settings(_) | Self::Radio(RadioError::Connection(_)) => ErrorSeverity::Error,
            Self::Radio(RadioError::Command(_)) => ErrorSeverity::Warning,
            Self::AlreadyRunning => ErrorSeverity::Warning,
            _ => ErrorSeverity::Info,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Error => {
                tracing::error!(error = %self, source = ?std::error::Error::source(self), "Alarm daemon error");
            }
            ErrorSeverity::Warning => {
                tracing::warn!(error = %self, "Alarm daemon warning");
            }
            ErrorSeverity::Info => {
                tracing::info!(error = %self, "Rejected request");
            }
        }
    }

    /// Create a settings validation error
    pub fn invalid_settings(reason: impl Into<String>) -> Self {
        Self::InvalidSettings(reason.into())
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// A collaborator (MPD, CouchDB) is failing
    Error,
    /// The operation failed but the daemon is healthy
    Warning,
    /// Bad input from the caller
    Info,
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
