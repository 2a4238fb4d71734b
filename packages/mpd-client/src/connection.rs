//! A single session with the MPD daemon
//!
//! The socket is split in two. A background reader task owns the read half,
//! forwards every line to the connection and publishes the connection state
//! on a `watch` channel. Because the reader runs whether or not anybody is
//! waiting for a reply, an idle connection notices EOF or a socket error and
//! flips to [`ConnectionState::Dead`] on its own.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::command::{encode_command_list, Command};
use crate::error::{CommandError, CommandResult, ConnectionError, ConnectionResult};
use crate::response::{parse_ack, Response, Status, ACK_PREFIX, GREETING_PREFIX, OK};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a connection: `Connecting -> Ready -> Dead`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, greeting not received yet
    Connecting,
    /// Greeting received, commands may be sent
    Ready,
    /// The transport ended or failed; never becomes ready again
    Dead,
}

/// A live session with the daemon
pub struct Connection {
    id: u64,
    address: String,
    server_version: String,
    writer: OwnedWriteHalf,
    lines: mpsc::UnboundedReceiver<String>,
    state: Arc<watch::Sender<ConnectionState>>,
    reader: JoinHandle<()>,
    awaiting_reply: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("server_version", &self.server_version)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Open a transport to `address` and wait for the daemon's greeting.
    ///
    /// Resolves only once the daemon is ready. An `ACK` greeting or EOF
    /// before the greeting fails the call and the transport is closed.
    pub async fn open(address: &str) -> ConnectionResult<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| ConnectionError::Connect {
                address: address.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to disable Nagle on MPD socket");
        }

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (read_half, writer) = stream.into_split();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);
        let (line_tx, lines) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_lines(id, read_half, line_tx, Arc::clone(&state)));

        let mut connection = Self {
            id,
            address: address.to_string(),
            server_version: String::new(),
            writer,
            lines,
            state,
            reader,
            awaiting_reply: false,
        };

        match connection.lines.recv().await {
            Some(line) => match line.strip_prefix(GREETING_PREFIX) {
                Some(version) => {
                    connection.server_version = version.trim().to_string();
                }
                None => {
                    return Err(ConnectionError::Handshake {
                        address: address.to_string(),
                        message: line,
                    });
                }
            },
            None => {
                return Err(ConnectionError::ClosedDuringHandshake {
                    address: address.to_string(),
                });
            }
        }

        // The reader may already have seen EOF; never resurrect a dead connection.
        connection.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Ready;
                true
            } else {
                false
            }
        });

        debug!(
            connection = id,
            address = %connection.address,
            version = %connection.server_version,
            "MPD connection ready"
        );

        Ok(connection)
    }

    /// Process-unique identifier of this connection
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Protocol version announced in the greeting
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Check if the transport has ended or failed
    pub fn is_dead(&self) -> bool {
        self.state() == ConnectionState::Dead
    }

    /// Receiver that observes state changes of this connection
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// A connection can go back to the pool only if it is alive and no reply
    /// is still pending (a dropped command future leaves one on the wire).
    pub fn is_reusable(&self) -> bool {
        !self.is_dead() && !self.awaiting_reply
    }

    /// Send one command and wait for its reply
    pub async fn send_command(&mut self, command: &Command) -> CommandResult<Response> {
        command.validate()?;
        let mut line = command.encode();
        line.push('\n');
        trace!(connection = self.id, command = %command, "MPD command");
        self.round_trip(line.as_bytes()).await
    }

    /// Send a batch as one command list.
    ///
    /// Commands run in order; the first failure aborts the rest and is
    /// returned as the daemon reported it.
    pub async fn send_commands(&mut self, commands: &[Command]) -> CommandResult<Response> {
        if commands.is_empty() {
            return Ok(Response::default());
        }
        for command in commands {
            command.validate()?;
        }
        trace!(
            connection = self.id,
            count = commands.len(),
            "MPD command list"
        );
        let payload = encode_command_list(commands);
        self.round_trip(payload.as_bytes()).await
    }

    /// Query and parse the player status
    pub async fn status(&mut self) -> CommandResult<Status> {
        self.send_command(&Command::status()).await.map(Status::from)
    }

    /// Close the connection. A dead connection is only dropped.
    pub fn close(self) {
        if self.is_dead() {
            debug!(connection = self.id, "Dropping dead MPD connection");
        } else {
            debug!(connection = self.id, "Closing MPD connection");
        }
    }

    async fn round_trip(&mut self, payload: &[u8]) -> CommandResult<Response> {
        if self.is_dead() {
            return Err(CommandError::Closed);
        }

        self.awaiting_reply = true;
        self.writer.write_all(payload).await?;
        let response = self.read_response().await;
        if !matches!(response, Err(CommandError::Closed)) {
            self.awaiting_reply = false;
        }
        response
    }

    async fn read_response(&mut self) -> CommandResult<Response> {
        let mut lines = Vec::new();
        loop {
            let line = self.lines.recv().await.ok_or(CommandError::Closed)?;
            if line == OK {
                return Ok(Response::new(lines));
            }
            if line.starts_with(ACK_PREFIX) {
                return Err(parse_ack(&line));
            }
            lines.push(line);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The reader owns the read half; aborting it closes the socket.
        if !self.reader.is_finished() {
            self.reader.abort();
        }
        self.state.send_replace(ConnectionState::Dead);
    }
}

async fn read_lines(
    id: u64,
    read_half: OwnedReadHalf,
    lines: mpsc::UnboundedSender<String>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let mut reader = BufReader::new(read_half).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!(connection = id, "MPD closed the connection");
                break;
            }
            Err(e) => {
                warn!(connection = id, error = %e, "MPD connection failed");
                break;
            }
        }
    }
    state.send_replace(ConnectionState::Dead);
}
