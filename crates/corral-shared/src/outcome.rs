//! The three-valued tool result.
//!
//! Every tool handler resolves to one of these; RUNNING carries the
//! tool-private phase state that the next invocation of the same tool call
//! receives back verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success { result: Value },
    Failure { error: String },
    Running { state: Value },
}

impl Outcome {
    pub fn success(result: impl Into<Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn running(state: Value) -> Self {
        Self::Running { state }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Flatten into the text appended to the message log: the serialized
    /// result on success, the error string on failure.
    pub fn into_log_content(self) -> Option<String> {
        match self {
            Self::Success { result } => Some(match result {
                Value::String(s) => s,
                other => serde_json::to_string(&other).unwrap_or_default(),
            }),
            Self::Failure { error } => Some(error),
            Self::Running { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_matches_status_tag() {
        let ok = serde_json::to_value(Outcome::success("done")).unwrap();
        assert_eq!(ok, json!({"status": "SUCCESS", "result": "done"}));

        let fail = serde_json::to_value(Outcome::failure("nope")).unwrap();
        assert_eq!(fail, json!({"status": "FAILURE", "error": "nope"}));

        let running = serde_json::to_value(Outcome::running(json!({"phase": "x"}))).unwrap();
        assert_eq!(running, json!({"status": "RUNNING", "state": {"phase": "x"}}));
    }

    #[test]
    fn log_content_flattens_strings() {
        assert_eq!(
            Outcome::success("plain").into_log_content().as_deref(),
            Some("plain")
        );
        assert_eq!(
            Outcome::success(json!({"n": 1})).into_log_content().as_deref(),
            Some("{\"n\":1}")
        );
        assert!(Outcome::running(json!(null)).into_log_content().is_none());
    }
}
