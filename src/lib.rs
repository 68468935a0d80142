//! Library interface: the same internals the CLI binary runs on, exposed
//! for embedding (drive a session from Rust without shelling out).

pub mod color;
pub mod commands;
pub mod connection;
pub mod daemon;
pub mod facade;
pub mod flags;
pub mod help;
pub mod output;
pub mod protocol;
pub mod session;

use serde_json::Value;
use thiserror::Error;

pub use protocol::Response;

#[derive(Debug, Error)]
pub enum SpelError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("daemon error: {0}")]
    Daemon(String),
    #[error("command error: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Embeddable client: one instance per session, one `run` per command line.
pub struct Spel {
    flags: flags::Flags,
}

impl Spel {
    pub fn new(session: &str) -> Self {
        let (mut flags, _) = flags::parse_flags(&[]);
        flags.session = session.to_string();
        Self { flags }
    }

    pub fn headed(mut self) -> Self {
        self.flags.interactive = true;
        self
    }

    /// Run one command line (e.g. `open example.com`, `click @e3`) against
    /// this session, starting the daemon when needed.
    pub fn run(&self, command: &str) -> Result<Value, SpelError> {
        let tokens = shell_split(command);
        if tokens.is_empty() {
            return Err(SpelError::Parse("empty command".into()));
        }
        let cmd = commands::parse_command(&tokens, &self.flags)
            .map_err(|e| SpelError::Parse(e.format()))?;

        connection::ensure_daemon(&self.flags).map_err(|e| SpelError::Daemon(e.to_string()))?;

        let resp = connection::send_command(&cmd, &self.flags)
            .map_err(|e| SpelError::Io(e.to_string()))?;
        if resp.success {
            Ok(resp.data.unwrap_or(Value::Null))
        } else {
            Err(SpelError::Command(
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    pub fn close(&self) -> Result<Value, SpelError> {
        self.run("close")
    }
}

/// Minimal shell-style tokenizer so `fill @e3 "hello world"` works as one
/// string.
pub fn shell_split(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_double = false;
    let mut in_single = false;

    for ch in input.chars() {
        match ch {
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            ' ' | '\t' if !in_double && !in_single => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_split() {
        assert_eq!(shell_split("open example.com"), vec!["open", "example.com"]);
        assert_eq!(
            shell_split(r#"fill @e3 "hello world""#),
            vec!["fill", "@e3", "hello world"]
        );
        assert_eq!(shell_split("eval 'a b'"), vec!["eval", "a b"]);
    }
}
