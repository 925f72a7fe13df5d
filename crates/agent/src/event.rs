//! Typed events emitted by a ReAct run.
//!
//! These serialize with a `type` tag, so a consumer can forward them as
//! JSON lines or SSE frames:
//! - `info`: progress notes such as `Iteration 2/7`
//! - `reasoning`: the model's thought for this step
//! - `action_proposed`: a resolved action, emitted before the tool runs
//! - `observation`: the dispatched tool's output
//! - `final_answer`: the answer, ends the run
//! - `error`: a fatal condition, ends the run

use crate::error::{AgentError, ErrorKind};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Info { content: String },

    Reasoning { content: String },

    ActionProposed {
        name: String,
        argument: String,
        content: String,
    },

    Observation { tool: String, content: String },

    FinalAnswer { content: String },

    Error { kind: ErrorKind, content: String },
}

impl AgentEvent {
    pub fn info(content: impl Into<String>) -> Self {
        Self::Info {
            content: content.into(),
        }
    }

    pub fn action_proposed(name: &str, argument: &str) -> Self {
        Self::ActionProposed {
            name: name.to_string(),
            argument: argument.to_string(),
            content: format!("Action: {name}[{argument}]"),
        }
    }

    pub fn error(err: &AgentError) -> Self {
        Self::Error {
            kind: err.kind(),
            content: err.to_string(),
        }
    }

    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Reasoning { .. } => "reasoning",
            Self::ActionProposed { .. } => "action_proposed",
            Self::Observation { .. } => "observation",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Error { .. } => "error",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Info { content }
            | Self::Reasoning { content }
            | Self::ActionProposed { content, .. }
            | Self::Observation { content, .. }
            | Self::FinalAnswer { content }
            | Self::Error { content, .. } => content,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// `final_answer` and `error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. } | Self::Error { .. })
    }

    /// Split `observation` and `final_answer` into one event per character.
    ///
    /// Other events, and events with empty content, pass through unchanged.
    pub fn into_char_frames(self) -> Vec<AgentEvent> {
        match self {
            Self::Observation { tool, content } if !content.is_empty() => content
                .chars()
                .map(|c| Self::Observation {
                    tool: tool.clone(),
                    content: c.to_string(),
                })
                .collect(),
            Self::FinalAnswer { content } if !content.is_empty() => content
                .chars()
                .map(|c| Self::FinalAnswer {
                    content: c.to_string(),
                })
                .collect(),
            other => vec![other],
        }
    }
}

/// Re-frame an event stream one character at a time for display.
pub fn char_frames<S>(events: S) -> impl Stream<Item = AgentEvent>
where
    S: Stream<Item = AgentEvent>,
{
    events.flat_map(|event| futures::stream::iter(event.into_char_frames()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = AgentEvent::FinalAnswer {
            content: "4".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"final_answer","content":"4"}"#);
    }

    #[test]
    fn error_event_carries_kind() {
        let err = AgentError::IterationsExhausted { budget: 7 };
        let event = AgentEvent::error(&err);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "iterations_exhausted");
        assert_eq!(event.error_kind(), Some(ErrorKind::IterationsExhausted));
        assert!(event.is_terminal());
    }

    #[test]
    fn action_proposed_content() {
        let event = AgentEvent::action_proposed("calculate", "2+2");
        assert_eq!(event.event_type(), "action_proposed");
        assert_eq!(event.content(), "Action: calculate[2+2]");
        assert!(!event.is_terminal());
    }

    #[test]
    fn round_trips_through_json() {
        let event = AgentEvent::Observation {
            tool: "calculate".into(),
            content: "4".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn char_frames_split_observations_and_answers() {
        let frames = AgentEvent::FinalAnswer {
            content: "héllo".into(),
        }
        .into_char_frames();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1].content(), "é");

        let info = AgentEvent::info("Iteration 1/7").into_char_frames();
        assert_eq!(info.len(), 1);

        let empty = AgentEvent::FinalAnswer {
            content: String::new(),
        }
        .into_char_frames();
        assert_eq!(empty.len(), 1);
    }

    #[tokio::test]
    async fn char_frames_stream_adapter() {
        let events = futures::stream::iter(vec![
            AgentEvent::info("Iteration 1/7"),
            AgentEvent::Observation {
                tool: "calculate".into(),
                content: "42".into(),
            },
        ]);
        let framed: Vec<AgentEvent> = char_frames(events).collect().await;
        let types: Vec<&str> = framed.iter().map(AgentEvent::event_type).collect();
        assert_eq!(types, vec!["info", "observation", "observation"]);
        assert_eq!(framed[2].content(), "2");
    }
}
