//! Fake MPD daemon for testing the pool and the radio controller
//!
//! Provides a [`MockMpdServer`] that speaks enough of the MPD line protocol
//! (greeting, single commands, command lists, `status`, `ACK` replies) to run
//! the client against a real TCP socket without a real daemon.
//!
//! Commands are recorded as `name` or `name:arg`, so a `play()` shows up as
//! `["clear", "setvol:100", "add:http://...", "play"]`. The `command_list_*`
//! framing itself is not recorded.
//!
//! # Lock Poisoning Recovery
//!
//! Locks are taken with `unwrap_or_else(|e| e.into_inner())` so a panicking
//! test does not cascade into `PoisonError`s in the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Protocol version announced in the greeting
pub const MOCK_MPD_VERSION: &str = "0.23.5";

/// Fake MPD daemon listening on an ephemeral localhost port
///
/// # Example
///
/// ```rust,ignore
/// use reveille_test_utils::MockMpdServer;
///
/// #[tokio::test]
/// async fn test_play() {
///     let mpd = MockMpdServer::start().await;
///     let pool = MpdPool::new(MpdConfig::with_address(mpd.host(), mpd.port()));
///     // ... run your test
///     assert_eq!(mpd.commands(), vec!["clear", "setvol:100", "add:http://x", "play"]);
/// }
/// ```
pub struct MockMpdServer {
    host: String,
    port: u16,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

struct Shared {
    commands: Mutex<Vec<String>>,
    player: Mutex<PlayerState>,
    failures: Mutex<HashMap<String, String>>,
    error: Mutex<Option<String>>,
    reject_handshake: AtomicBool,
    connections_opened: AtomicUsize,
    connections_active: AtomicUsize,
    disconnect: watch::Sender<u64>,
}

struct PlayerState {
    state: String,
    volume: u8,
}

impl MockMpdServer {
    /// Start a new fake daemon on `127.0.0.1` with an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock MPD listener");
        let local = listener.local_addr().expect("mock MPD local address");
        let (disconnect, _) = watch::channel(0);

        let shared = Arc::new(Shared {
            commands: Mutex::new(Vec::new()),
            player: Mutex::new(PlayerState {
                state: "stop".to_string(),
                volume: 100,
            }),
            failures: Mutex::new(HashMap::new()),
            error: Mutex::new(None),
            reject_handshake: AtomicBool::new(false),
            connections_opened: AtomicUsize::new(0),
            connections_active: AtomicUsize::new(0),
            disconnect,
        });

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));

        Self {
            host: local.ip().to_string(),
            port: local.port(),
            shared,
            accept_task,
        }
    }

    /// Host the daemon listens on
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the daemon listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Every command received so far, in arrival order
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded commands with the given name (e.g. every `setvol:N`)
    pub fn commands_named(&self, name: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c == name || c.starts_with(&format!("{name}:")))
            .collect()
    }

    /// Forget the recorded commands
    pub fn clear_commands(&self) {
        self.shared.commands.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Player state reported by `status` (`play`, `stop`, `pause`)
    pub fn set_state(&self, state: &str) {
        self.shared.player.lock().unwrap_or_else(|e| e.into_inner()).state = state.to_string();
    }

    /// Volume last set through `setvol`
    pub fn volume(&self) -> u8 {
        self.shared.player.lock().unwrap_or_else(|e| e.into_inner()).volume
    }

    /// Make every command fail with `ACK [5@i] {cmd} message`; `None` restores success
    pub fn set_error(&self, message: Option<&str>) {
        *self.shared.error.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    /// Make one command fail with the given message
    pub fn fail_command(&self, name: &str, message: &str) {
        self.shared
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), message.to_string());
    }

    /// Greet new clients with an `ACK` instead of `OK MPD`
    pub fn reject_handshakes(&self, reject: bool) {
        self.shared.reject_handshake.store(reject, Ordering::SeqCst);
    }

    /// Number of client connections accepted so far
    pub fn connections_opened(&self) -> usize {
        self.shared.connections_opened.load(Ordering::SeqCst)
    }

    /// Number of client connections currently open
    pub fn connections_active(&self) -> usize {
        self.shared.connections_active.load(Ordering::SeqCst)
    }

    /// Close every open client connection. New connections are still accepted.
    pub fn disconnect_all(&self) {
        self.shared.disconnect.send_modify(|generation| *generation += 1);
    }
}

impl Drop for MockMpdServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.disconnect_all();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((socket, _)) = listener.accept().await {
        shared.connections_opened.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(socket, Arc::clone(&shared)));
    }
}

async fn serve(socket: TcpStream, shared: Arc<Shared>) {
    let mut disconnect = shared.disconnect.subscribe();
    disconnect.borrow_and_update();
    shared.connections_active.fetch_add(1, Ordering::SeqCst);

    let (read_half, mut writer) = socket.into_split();

    if shared.reject_handshake.load(Ordering::SeqCst) {
        let _ = writer
            .write_all(b"ACK [5@0] {} too many clients\n")
            .await;
        shared.connections_active.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    if writer
        .write_all(format!("OK MPD {MOCK_MPD_VERSION}\n").as_bytes())
        .await
        .is_err()
    {
        shared.connections_active.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    let mut lines = BufReader::new(read_half).lines();
    let mut batch: Option<Vec<String>> = None;

    loop {
        let line = tokio::select! {
            _ = disconnect.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
        };

        let reply = match line.as_str() {
            "command_list_begin" | "command_list_ok_begin" => {
                batch = Some(Vec::new());
                continue;
            }
            "command_list_end" => shared.execute(batch.take().unwrap_or_default()),
            _ => match batch.as_mut() {
                Some(pending) => {
                    pending.push(line);
                    continue;
                }
                None => shared.execute(vec![line]),
            },
        };

        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }

    shared.connections_active.fetch_sub(1, Ordering::SeqCst);
}

impl Shared {
    /// Run a batch the way MPD does: in order, stopping at the first failure
    fn execute(&self, lines: Vec<String>) -> String {
        let mut payload = String::new();

        for (index, line) in lines.iter().enumerate() {
            let (name, arg) = parse_line(line);
            self.commands
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(match &arg {
                    Some(arg) => format!("{name}:{arg}"),
                    None => name.clone(),
                });

            if let Some(message) = self.failure_for(&name) {
                return format!("ACK [5@{index}] {{{name}}} {message}\n");
            }

            let mut player = self.player.lock().unwrap_or_else(|e| e.into_inner());
            match name.as_str() {
                "setvol" => {
                    if let Some(volume) = arg.as_deref().and_then(|v| v.parse().ok()) {
                        player.volume = volume;
                    }
                }
                "play" => player.state = "play".to_string(),
                "stop" => player.state = "stop".to_string(),
                "status" => {
                    payload.push_str(&format!(
                        "volume: {}\nrepeat: 0\nrandom: 0\nstate: {}\n",
                        player.volume, player.state
                    ));
                }
                _ => {}
            }
        }

        payload.push_str("OK\n");
        payload
    }

    fn failure_for(&self, name: &str) -> Option<String> {
        if let Some(message) = self.error.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Some(message);
        }
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

/// Split `name "arg"` into its name and unescaped first argument
fn parse_line(line: &str) -> (String, Option<String>) {
    let (name, rest) = match line.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (line.trim(), ""),
    };

    if rest.is_empty() {
        return (name.to_string(), None);
    }

    let arg = match rest.strip_prefix('"') {
        Some(quoted) => {
            let mut arg = String::new();
            let mut chars = quoted.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => arg.extend(chars.next()),
                    '"' => break,
                    c => arg.push(c),
                }
            }
            arg
        }
        None => rest.to_string(),
    };

    (name.to_string(), Some(arg))
}
