//! MPD protocol client for reveille
//!
//! Provides a bounded, self-healing pool of connections to a Music Player
//! Daemon and the small command vocabulary the radio controller needs.
//!
//! # Example
//!
//! ```rust,ignore
//! use reveille_mpd_client::{Command, MpdPool};
//! use reveille_shared_config::MpdConfig;
//!
//! let pool = MpdPool::new(MpdConfig::from_env()?);
//! let mut connection = pool.acquire().await?;
//! connection
//!     .send_commands(&[Command::clear(), Command::add(url), Command::play()])
//!     .await?;
//! pool.release(connection);
//! ```

mod command;
mod connection;
mod error;
mod pool;
mod response;

pub use command::{encode_command_list, quote_argument, Command};
pub use connection::{Connection, ConnectionState};
pub use error::{CommandError, CommandResult, ConnectionError, ConnectionResult};
pub use pool::{MpdPool, PoolStatus, PooledConnection};
pub use response::{parse_ack, parse_key_values, PlayerState, Response, Status};
