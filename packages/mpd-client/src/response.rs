//! MPD replies: `key: value` payloads, `ACK` lines and the player status

use std::collections::HashMap;

use crate::error::CommandError;

/// Prefix of the greeting line sent by the daemon on connect
pub const GREETING_PREFIX: &str = "OK MPD ";

/// Line terminating a successful reply
pub const OK: &str = "OK";

/// Prefix of an error reply
pub const ACK_PREFIX: &str = "ACK ";

/// Payload lines of a successful reply (the final `OK` is not included)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    lines: Vec<String>,
}

impl Response {
    pub(crate) fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Raw payload lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Check if the daemon sent nothing but `OK`
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse the payload as `key: value` pairs. Later keys win.
    pub fn key_values(&self) -> HashMap<String, String> {
        parse_key_values(self.lines.iter().map(String::as_str))
    }
}

/// Parse newline-delimited `key: value` pairs, skipping malformed lines
pub fn parse_key_values<'a>(lines: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    lines
        .into_iter()
        .filter_map(|line| {
            let (key, value) = line.split_once(": ")?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse an `ACK [code@index] {command} message` line.
///
/// A line that does not follow that shape becomes [`CommandError::Protocol`].
pub fn parse_ack(line: &str) -> CommandError {
    parse_ack_parts(line).unwrap_or_else(|| CommandError::Protocol(line.to_string()))
}

fn parse_ack_parts(line: &str) -> Option<CommandError> {
    let rest = line.strip_prefix(ACK_PREFIX)?.strip_prefix('[')?;
    let (position, rest) = rest.split_once(']')?;
    let (code, list_index) = position.split_once('@')?;
    let (command, message) = rest.trim_start().strip_prefix('{')?.split_once('}')?;

    Some(CommandError::Ack {
        code: code.parse().ok()?,
        list_index: list_index.parse().ok()?,
        command: command.to_string(),
        message: message.trim_start().to_string(),
    })
}

/// Playback state reported by `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    Play,
    Stop,
    Pause,
    /// Any value this client does not know about
    Other(String),
}

impl From<&str> for PlayerState {
    fn from(value: &str) -> Self {
        match value {
            "play" => Self::Play,
            "stop" => Self::Stop,
            "pause" => Self::Pause,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Parsed reply of the `status` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    fields: HashMap<String, String>,
}

impl Status {
    /// Player state, if the daemon reported one
    pub fn state(&self) -> Option<PlayerState> {
        self.fields.get("state").map(|s| PlayerState::from(s.as_str()))
    }

    /// True only when `state` is exactly `play`
    pub fn is_playing(&self) -> bool {
        self.fields.get("state").map(String::as_str) == Some("play")
    }

    /// Volume in percent; MPD reports `-1` when no mixer is available
    pub fn volume(&self) -> Option<i32> {
        self.fields.get("volume").and_then(|v| v.parse().ok())
    }

    /// Any other raw field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl From<Response> for Status {
    fn from(response: Response) -> Self {
        Self {
            fields: response.key_values(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(lines: &[&str]) -> Response {
        Response::new(lines.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn test_parse_key_values() {
        let values = response(&["volume: 40", "state: play", "garbage"]).key_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["volume"], "40");
        assert_eq!(values["state"], "play");
    }

    #[test]
    fn test_value_may_contain_separator() {
        let values = parse_key_values(["file: http://radio.example/a: b"]);
        assert_eq!(values["file"], "http://radio.example/a: b");
    }

    #[test]
    fn test_status_is_playing_only_for_play() {
        assert!(Status::from(response(&["state: play"])).is_playing());
        assert!(!Status::from(response(&["state: stop"])).is_playing());
        assert!(!Status::from(response(&["state: pause"])).is_playing());
        assert!(!Status::from(response(&["volume: 10"])).is_playing());
    }

    #[test]
    fn test_status_fields() {
        let status = Status::from(response(&["volume: -1", "state: pause", "song: 3"]));
        assert_eq!(status.state(), Some(PlayerState::Pause));
        assert_eq!(status.volume(), Some(-1));
        assert_eq!(status.get("song"), Some("3"));
    }

    #[test]
    fn test_parse_ack() {
        match parse_ack("ACK [50@1] {play} No such song") {
            CommandError::Ack {
                code,
                list_index,
                command,
                message,
            } => {
                assert_eq!(code, 50);
                assert_eq!(list_index, 1);
                assert_eq!(command, "play");
                assert_eq!(message, "No such song");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ack_malformed() {
        assert!(matches!(
            parse_ack("ACK what"),
            CommandError::Protocol(_)
        ));
    }
}
