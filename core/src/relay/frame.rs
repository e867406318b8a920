//! Frames written back to a client connection

use serde::Serialize;

/// Content sent in place of a fragment the moderation gate rejected.
pub const REFUSAL_CONTENT: &str = "This topic is not suitable for discussion.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Ok,
    Fail,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClientFrame {
    /// One streamed fragment. `None` for deltas that carry no text.
    pub fn ok(content: Option<String>) -> Self {
        Self {
            kind: FrameKind::Ok,
            status: 200,
            content,
            message: None,
        }
    }

    pub fn refusal() -> Self {
        Self::ok(Some(REFUSAL_CONTENT.to_string()))
    }

    pub fn done() -> Self {
        Self {
            kind: FrameKind::Done,
            status: 200,
            content: None,
            message: None,
        }
    }

    /// Terminal failure of the whole request.
    pub fn fail(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Fail,
            status,
            content: None,
            message: Some(message.into()),
        }
    }

    /// Failure scoped to a single upstream event; the stream keeps going.
    pub fn event_fail(error: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Fail,
            status: 200,
            content: Some(error.into()),
            message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.kind {
            FrameKind::Done => true,
            FrameKind::Fail => self.message.is_some(),
            FrameKind::Ok => false,
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
