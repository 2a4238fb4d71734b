//! MPD client error types

use thiserror::Error;

/// Failure to obtain a ready connection from the pool
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The transport could not be opened
    #[error("cannot connect to MPD at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The daemon answered the connection with something other than its greeting
    #[error("MPD at {address} rejected the connection: {message}")]
    Handshake { address: String, message: String },

    /// The transport closed before the daemon sent its greeting
    #[error("MPD at {address} closed the connection during handshake")]
    ClosedDuringHandshake { address: String },

    /// The pool has been shut down
    #[error("MPD connection pool is closed")]
    PoolClosed,
}

/// Failure of a single command or command list
#[derive(Error, Debug)]
pub enum CommandError {
    /// The daemon rejected the command. Displays the daemon's own message.
    #[error("{message}")]
    Ack {
        /// MPD error code (`ACK_ERROR_*`)
        code: u32,
        /// Position of the failing command inside a command list
        list_index: u32,
        /// Name of the failing command as reported by the daemon
        command: String,
        /// Human readable message from the daemon
        message: String,
    },

    /// Writing to or reading from the socket failed
    #[error("MPD transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was already dead or died while waiting for the reply
    #[error("MPD connection is closed")]
    Closed,

    /// The daemon sent a line this client does not understand
    #[error("unexpected reply from MPD: {0}")]
    Protocol(String),

    /// An argument would break the line framing; nothing was sent
    #[error("argument of MPD command \"{command}\" contains a line break")]
    InvalidArgument { command: String },
}

impl CommandError {
    /// Check if the daemon itself rejected the command
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { .. })
    }

    /// Check if the failure means the connection can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed | Self::Protocol(_))
    }
}

/// Result type for pool operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Result type for command execution
pub type CommandResult<T> = Result<T, CommandError>;
