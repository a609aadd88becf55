//! Agent event types for streaming.
//!
//! This module defines the contract for events consumed from a backend run.
//! The taxonomy is closed: unrecognized kinds deserialize to `Unknown` and
//! are logged and dropped by the session pump; no kind is fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by the backend during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A new assistant message has started.
    MessageStart {
        #[serde(default)]
        message_id: String,
    },

    /// Incremental text fragment from the assistant.
    ContentDelta {
        #[serde(default)]
        text: String,
    },

    /// The current assistant message is complete.
    MessageEnd,

    /// The agent started invoking a tool (logged, not displayed).
    ToolCallStart {
        #[serde(default)]
        name: String,
    },

    /// A tool invocation finished (logged, not displayed).
    ToolCallEnd {
        #[serde(default)]
        name: String,
    },

    /// The run failed mid-stream.
    Error {
        #[serde(default)]
        message: String,
    },

    /// Full agent state snapshot; owned by a different tier, ignored here.
    StateSnapshot {
        #[serde(default)]
        state: Value,
    },

    /// Incremental agent state update; owned by a different tier, ignored
    /// here.
    StateDelta {
        #[serde(default)]
        delta: Value,
    },

    /// Any event kind this tier does not recognize.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_content_delta_roundtrip() {
        let event = AgentEvent::ContentDelta {
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"content_delta""#));
        let parsed: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_message_start_missing_id_defaults_empty() {
        let parsed: AgentEvent = serde_json::from_value(json!({"type": "message_start"})).unwrap();
        assert_eq!(
            parsed,
            AgentEvent::MessageStart {
                message_id: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_kind_is_not_fatal() {
        let parsed: AgentEvent =
            serde_json::from_value(json!({"type": "telemetry_blob", "payload": 42})).unwrap();
        assert_eq!(parsed, AgentEvent::Unknown);
    }

    #[test]
    fn test_state_events_parse() {
        let parsed: AgentEvent =
            serde_json::from_value(json!({"type": "state_delta", "delta": {"k": 1}})).unwrap();
        assert_eq!(
            parsed,
            AgentEvent::StateDelta {
                delta: json!({"k": 1})
            }
        );
    }
}
