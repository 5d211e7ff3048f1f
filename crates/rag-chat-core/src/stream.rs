//! UI message stream framing.
//!
//! A streamed answer is framed as
//!
//! ```text
//! start → text-start → text-delta* → text-end → finish
//! ```
//!
//! followed by the `[DONE]` marker. A failure after `start` is reported as a
//! single `error` event and ends the stream without `finish`.
//!
//! [`StreamFramer`] enforces the ordering; transports only serialize the
//! events it hands out.

use serde::Serialize;

/// Final SSE payload after the last event.
pub const DONE_MARKER: &str = "[DONE]";

/// Response header announcing the UI message stream protocol.
pub const STREAM_HEADER: (&str, &str) = ("x-vercel-ai-ui-message-stream", "v1");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Finish,
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Open,
    Closed,
}

/// Turns fragments into correctly ordered [`StreamEvent`]s for one answer.
#[derive(Debug)]
pub struct StreamFramer {
    message_id: String,
    text_id: String,
    phase: Phase,
}

impl StreamFramer {
    pub fn new(message_id: impl Into<String>) -> Self {
        let message_id = message_id.into();
        Self {
            text_id: format!("{}-text", message_id),
            message_id,
            phase: Phase::Idle,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// `start` and `text-start`; empty once opened.
    pub fn open(&mut self) -> Vec<StreamEvent> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        self.phase = Phase::Open;
        vec![
            StreamEvent::Start {
                message_id: self.message_id.clone(),
            },
            StreamEvent::TextStart {
                id: self.text_id.clone(),
            },
        ]
    }

    /// Opens the stream if needed. Empty fragments emit nothing.
    pub fn delta(&mut self, fragment: &str) -> Vec<StreamEvent> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        let mut events = self.open();
        if !fragment.is_empty() {
            events.push(StreamEvent::TextDelta {
                id: self.text_id.clone(),
                delta: fragment.to_string(),
            });
        }
        events
    }

    /// `text-end` and `finish`, opening first when nothing was sent.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        let mut events = self.open();
        self.phase = Phase::Closed;
        events.push(StreamEvent::TextEnd {
            id: self.text_id.clone(),
        });
        events.push(StreamEvent::Finish);
        events
    }

    /// One `error` event; the stream is closed afterwards.
    pub fn error(&mut self, message: impl Into<String>) -> Vec<StreamEvent> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        self.phase = Phase::Closed;
        vec![StreamEvent::Error {
            error_text: message.into(),
        }]
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                StreamEvent::Start { .. } => "start",
                StreamEvent::TextStart { .. } => "text-start",
                StreamEvent::TextDelta { .. } => "text-delta",
                StreamEvent::TextEnd { .. } => "text-end",
                StreamEvent::Finish => "finish",
                StreamEvent::Error { .. } => "error",
            })
            .collect()
    }

    #[test]
    fn test_event_order() {
        let mut framer = StreamFramer::new("msg");
        let mut events = framer.delta("Hel");
        events.extend(framer.delta(""));
        events.extend(framer.delta("lo"));
        events.extend(framer.finish());
        events.extend(framer.delta("late"));
        events.extend(framer.finish());
        assert_eq!(
            kinds(&events),
            vec!["start", "text-start", "text-delta", "text-delta", "text-end", "finish"]
        );
    }

    #[test]
    fn test_finish_without_deltas() {
        let mut framer = StreamFramer::new("msg");
        assert_eq!(
            kinds(&framer.finish()),
            vec!["start", "text-start", "text-end", "finish"]
        );
    }

    #[test]
    fn test_error_closes_stream() {
        let mut framer = StreamFramer::new("msg");
        let mut events = framer.delta("partial");
        events.extend(framer.error("model error: boom"));
        events.extend(framer.finish());
        assert_eq!(kinds(&events), vec!["start", "text-start", "text-delta", "error"]);
        assert!(framer.is_closed());
    }

    #[test]
    fn test_wire_shape() {
        let start = serde_json::to_value(StreamEvent::Start {
            message_id: "m".into(),
        })
        .unwrap();
        assert_eq!(start, serde_json::json!({"type": "start", "messageId": "m"}));

        let delta = serde_json::to_value(StreamEvent::TextDelta {
            id: "t".into(),
            delta: "x".into(),
        })
        .unwrap();
        assert_eq!(
            delta,
            serde_json::json!({"type": "text-delta", "id": "t", "delta": "x"})
        );

        let finish = serde_json::to_value(StreamEvent::Finish).unwrap();
        assert_eq!(finish, serde_json::json!({"type": "finish"}));

        let error = serde_json::to_value(StreamEvent::Error {
            error_text: "bad".into(),
        })
        .unwrap();
        assert_eq!(error, serde_json::json!({"type": "error", "errorText": "bad"}));
    }
}
