//! Verification verdicts produced by the checker invoker

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Severity tag the checker uses for hard errors
pub const ERROR_SEVERITY: &str = "error";

/// Why a verdict is negative for reasons other than the proof itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Checker exceeded its time budget and was killed
    Timeout,
    /// Checker crashed, produced no output, or could not be run at all
    ProcessError,
    /// Checker produced output that is not a protocol response
    MalformedOutput,
}

impl FailureReason {
    /// Stable snake_case label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::ProcessError => "process_error",
            FailureReason::MalformedOutput => "malformed_output",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic record reported by the checker (a sorry or a message)
///
/// Only `severity` is interpreted; every other field (`pos`, `endPos`,
/// `data`, `goal`, ...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Diagnostic {
    /// An error diagnostic carrying only a `data` text
    pub fn error(data: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("data".to_string(), Value::String(data.into()));
        Self {
            severity: Some(ERROR_SEVERITY.to_string()),
            fields,
        }
    }

    /// Whether this record is tagged with the error severity
    pub fn is_error(&self) -> bool {
        self.severity.as_deref() == Some(ERROR_SEVERITY)
    }

    /// The human-readable `data` field, if present
    pub fn data(&self) -> Option<&str> {
        self.fields.get("data").and_then(Value::as_str)
    }
}

/// Structured outcome of running one job through the checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub success: bool,
    #[serde(default)]
    pub sorries: Vec<Diagnostic>,
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Free-form detail for failures (stderr excerpt, parse error, panic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Wall-clock time spent in the checker
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
}

impl VerificationVerdict {
    /// Build a verdict from checker diagnostics; success iff both lists are empty
    pub fn from_diagnostics(
        sorries: Vec<Diagnostic>,
        errors: Vec<Diagnostic>,
        duration: Duration,
    ) -> Self {
        Self {
            success: sorries.is_empty() && errors.is_empty(),
            sorries,
            errors,
            failure_reason: None,
            detail: None,
            duration,
        }
    }

    /// A negative verdict caused by something other than the proof
    pub fn failure(reason: FailureReason, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            sorries: Vec::new(),
            errors: Vec::new(),
            failure_reason: Some(reason),
            detail: Some(detail.into()),
            duration,
        }
    }

    /// Shorthand for a timeout verdict
    pub fn timeout(limit: Duration, elapsed: Duration) -> Self {
        Self::failure(
            FailureReason::Timeout,
            format!("checker exceeded {limit:?}"),
            elapsed,
        )
    }

    /// True when the checker ran to completion and reported a verdict
    pub fn is_checked(&self) -> bool {
        self.failure_reason.is_none()
    }

    /// Short label for log fields: `proven`, `rejected`, or the failure reason
    pub fn outcome_label(&self) -> &'static str {
        match self.failure_reason {
            Some(reason) => reason.as_str(),
            None if self.success => "proven",
            None => "rejected",
        }
    }
}

/// Serialize `Duration` as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
