//! MPD commands and their wire encoding

use std::fmt;

use crate::error::{CommandError, CommandResult};

/// A single MPD command with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<String>,
}

impl Command {
    /// Build a command from a name and raw (unescaped) arguments
    pub fn new(name: &'static str, args: Vec<String>) -> Self {
        Self { name, args }
    }

    /// `clear` - empty the current playlist
    pub fn clear() -> Self {
        Self::new("clear", Vec::new())
    }

    /// `setvol` - set the volume, clamped to 0..=100
    pub fn setvol(level: u8) -> Self {
        Self::new("setvol", vec![level.min(100).to_string()])
    }

    /// `add` - append a URI to the current playlist
    pub fn add(uri: impl Into<String>) -> Self {
        Self::new("add", vec![uri.into()])
    }

    /// `play` - start playback
    pub fn play() -> Self {
        Self::new("play", Vec::new())
    }

    /// `stop` - stop playback
    pub fn stop() -> Self {
        Self::new("stop", Vec::new())
    }

    /// `status` - query the player status
    pub fn status() -> Self {
        Self::new("status", Vec::new())
    }

    /// Command name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Raw arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Check that every argument fits on one protocol line
    pub fn validate(&self) -> CommandResult<()> {
        if self.args.iter().any(|arg| arg.contains(['\n', '\r'])) {
            return Err(CommandError::InvalidArgument {
                command: self.name.to_string(),
            });
        }
        Ok(())
    }

    /// Encode the command as one protocol line, without the trailing newline
    pub fn encode(&self) -> String {
        let mut line = String::from(self.name);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote_argument(arg));
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Wrap an argument in double quotes, escaping `"` and `\`
pub fn quote_argument(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Encode a batch as an MPD command list.
///
/// The daemon executes the list in order and stops at the first failing
/// command, answering with a single `OK` or `ACK` for the whole batch.
pub fn encode_command_list(commands: &[Command]) -> String {
    let mut payload = String::from("command_list_begin\n");
    for command in commands {
        payload.push_str(&command.encode());
        payload.push('\n');
    }
    payload.push_str("command_list_end\n");
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_args() {
        assert_eq!(Command::clear().encode(), "clear");
        assert_eq!(Command::status().encode(), "status");
    }

    #[test]
    fn test_encode_quotes_args() {
        assert_eq!(Command::setvol(40).encode(), "setvol \"40\"");
        assert_eq!(
            Command::add("http://bbc.example/stream").encode(),
            "add \"http://bbc.example/stream\""
        );
    }

    #[test]
    fn test_setvol_is_clamped() {
        assert_eq!(Command::setvol(250).args(), ["100".to_string()]);
    }

    #[test]
    fn test_quote_argument_escapes() {
        assert_eq!(quote_argument(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }

    #[test]
    fn test_command_list() {
        let payload = encode_command_list(&[Command::stop(), Command::clear()]);
        assert_eq!(payload, "command_list_begin\nstop\nclear\ncommand_list_end\n");
    }

    #[test]
    fn test_line_breaks_are_rejected() {
        assert!(Command::add("http://a\nstop").validate().is_err());
        assert!(Command::add("http://a\rstop").validate().is_err());
        assert!(Command::add("http://bbc.example/stream").validate().is_ok());
        assert!(Command::clear().validate().is_ok());
    }
}
