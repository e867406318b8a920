//! Inbound WebSocket messages

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::RelayError;

/// A chat request. Everything except the relay's own fields is forwarded to
/// the upstream as the request body.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Upstream path, e.g. `/v1/chat/completions`.
    pub action: String,
    /// Caller credential, or a value containing the shared-credential marker.
    pub key: String,
    #[serde(default)]
    pub moderation_level: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ChatRequest {
    /// Passthrough fields with `stream` forced on.
    pub fn upstream_body(&self) -> Value {
        let mut body = self.options.clone();
        body.insert("stream".to_string(), Value::Bool(true));
        Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Chat(ChatRequest),
    /// Any other message type; answered with the server time.
    Other,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Object(mut fields) if fields.get("type").and_then(|t| t.as_str()) == Some("chat") => {
                fields.remove("type");
                let request = serde_json::from_value(Value::Object(fields))?;
                Ok(Self::Chat(request))
            }
            Value::Null => Err(RelayError::InvalidMessage(serde::de::Error::custom(
                "expected a JSON object, found null",
            ))),
            _ => Ok(Self::Other),
        }
    }
}
