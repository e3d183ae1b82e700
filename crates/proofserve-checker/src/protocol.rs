//! Lean REPL wire protocol
//!
//! Requests are a single JSON line followed by a blank-line delimiter:
//!
//! ```text
//! {"cmd":"theorem t : 2 + 2 = 4 := by ring","allTactics":false,"ast":false,"tactics":false,"premises":false}\r\n\r\n
//! ```
//!
//! The response is one JSON object with `sorries` and `messages` arrays.
//! A command-level failure is reported as `{"message": "..."}` instead.

use crate::verdict::Diagnostic;
use serde::{Deserialize, Serialize};

/// Terminates a request; the REPL reads commands separated by blank lines
pub const REQUEST_DELIMITER: &str = "\r\n\r\n";

/// A REPL command with every auxiliary analysis disabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplCommand {
    pub cmd: String,
    pub all_tactics: bool,
    pub ast: bool,
    pub tactics: bool,
    pub premises: bool,
}

impl ReplCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            all_tactics: false,
            ast: false,
            tactics: false,
            premises: false,
        }
    }

    /// Serialize as a single line plus the request delimiter
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::to_string(self)?;
        payload.push_str(REQUEST_DELIMITER);
        Ok(payload)
    }
}

/// The subset of a REPL response the dispatcher cares about
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplResponse {
    #[serde(default)]
    pub sorries: Vec<Diagnostic>,
    #[serde(default)]
    pub messages: Vec<Diagnostic>,
    /// Command-level failure (unknown environment, bad JSON, ...)
    #[serde(default)]
    pub message: Option<String>,
}

impl ReplResponse {
    /// Parse stdout. Leading/trailing whitespace is ignored.
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stdout.trim())
    }

    /// Messages with error severity, plus the command-level failure if any
    pub fn errors(&self) -> Vec<Diagnostic> {
        let mut errors: Vec<Diagnostic> = self
            .messages
            .iter()
            .filter(|m| m.is_error())
            .cloned()
            .collect();
        if let Some(message) = &self.message {
            errors.push(Diagnostic::error(message.clone()));
        }
        errors
    }

    /// Split into the `(sorries, errors)` pair a verdict is built from
    pub fn into_parts(self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        let errors = self.errors();
        (self.sorries, errors)
    }
}
