//! Content moderation gate applied to streamed fragments

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::Duration;

/// Level that switches the gate to strict mode.
pub const STRICT_LEVEL: &str = "high";

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("moderation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("moderation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("moderation response has no verdict")]
    MissingVerdict,
}

/// Verdict reported by the external classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Review,
    Block,
    Other(String),
}

impl Verdict {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" => Self::Pass,
            "review" => Self::Review,
            "block" => Self::Block,
            other => Self::Other(other.to_string()),
        }
    }

    /// `high` blocks anything not affirmatively clean, every other level
    /// blocks only an explicit `block`.
    pub fn is_blocked(&self, level: Option<&str>) -> bool {
        if level == Some(STRICT_LEVEL) {
            *self != Self::Pass
        } else {
            *self == Self::Block
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub blocked: bool,
}

/// External text classifier
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn verdict(&self, text: &str) -> Result<Verdict, ModerationError>;
}

/// Optional moderation in front of every fragment. Without a classifier
/// every fragment is allowed and no call is made.
#[derive(Clone, Default)]
pub struct ModerationGate {
    classifier: Option<Arc<dyn Classifier>>,
}

impl ModerationGate {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn disabled() -> Self {
        Self { classifier: None }
    }

    /// Build the HTTP-backed gate when both endpoint and key are configured.
    pub fn from_config(config: &crate::config::ModerationConfig) -> Self {
        match config.credentials() {
            Some((endpoint, key)) => {
                tracing::info!("Moderation enabled via {}", endpoint);
                Self::new(Arc::new(HttpClassifier::new(endpoint, key)))
            }
            None => {
                tracing::info!("Moderation disabled (no endpoint/key configured)");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn classify(&self, text: &str, level: Option<&str>) -> Result<Decision, ModerationError> {
        let Some(classifier) = &self.classifier else {
            return Ok(Decision::default());
        };

        let verdict = classifier.verdict(text).await?;
        let blocked = verdict.is_blocked(level);
        if blocked {
            tracing::info!("Fragment blocked (verdict {:?}, level {:?})", verdict, level);
        }
        Ok(Decision { blocked })
    }
}

/// Classifier backed by a JSON moderation endpoint.
///
/// Sends `{"text": ...}` with a bearer key and reads the verdict from a
/// `suggestion` or `verdict` string field, at the top level or nested under
/// `data`/`Response`.
pub struct HttpClassifier {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn extract_verdict(body: &Value) -> Option<&str> {
        [body, &body["data"], &body["Response"]].into_iter().find_map(|node| {
            ["suggestion", "Suggestion", "verdict"]
                .iter()
                .find_map(|field| node.get(*field).and_then(|v| v.as_str()))
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn verdict(&self, text: &str) -> Result<Verdict, ModerationError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        Self::extract_verdict(&body)
            .map(Verdict::parse)
            .ok_or(ModerationError::MissingVerdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        verdict: Verdict,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for Fixed {
        async fn verdict(&self, _text: &str) -> Result<Verdict, ModerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    fn gate(verdict: Verdict) -> (ModerationGate, Arc<Fixed>) {
        let fixed = Arc::new(Fixed {
            verdict,
            calls: AtomicUsize::new(0),
        });
        (ModerationGate::new(fixed.clone()), fixed)
    }

    #[test]
    fn verdict_parsing_ignores_case() {
        assert_eq!(Verdict::parse("Pass"), Verdict::Pass);
        assert_eq!(Verdict::parse("REVIEW"), Verdict::Review);
        assert_eq!(Verdict::parse(" block "), Verdict::Block);
        assert_eq!(Verdict::parse("unknown"), Verdict::Other("unknown".to_string()));
    }

    #[test]
    fn strict_level_blocks_everything_but_pass() {
        let high = Some("high");
        assert!(!Verdict::Pass.is_blocked(high));
        assert!(Verdict::Review.is_blocked(high));
        assert!(Verdict::Block.is_blocked(high));
        assert!(Verdict::Other("maybe".into()).is_blocked(high));
    }

    #[test]
    fn default_level_blocks_only_block() {
        for level in [None, Some("low"), Some("")] {
            assert!(!Verdict::Pass.is_blocked(level));
            assert!(!Verdict::Review.is_blocked(level));
            assert!(Verdict::Block.is_blocked(level));
            assert!(!Verdict::Other("maybe".into()).is_blocked(level));
        }
    }

    #[tokio::test]
    async fn disabled_gate_allows_without_calling() {
        let gate = ModerationGate::disabled();
        assert!(!gate.is_enabled());
        let decision = gate.classify("anything", Some("high")).await.unwrap();
        assert!(!decision.blocked);
    }

    #[tokio::test]
    async fn review_verdict_depends_on_level() {
        let (gate, fixed) = gate(Verdict::Review);
        assert!(gate.classify("hmm", Some("high")).await.unwrap().blocked);
        assert!(!gate.classify("hmm", None).await.unwrap().blocked);
        assert_eq!(fixed.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn verdict_is_found_in_nested_payloads() {
        let top = json!({"suggestion": "Pass"});
        let nested = json!({"Response": {"Suggestion": "Block", "RequestId": "x"}});
        let data = json!({"data": {"verdict": "review"}});
        assert_eq!(HttpClassifier::extract_verdict(&top), Some("Pass"));
        assert_eq!(HttpClassifier::extract_verdict(&nested), Some("Block"));
        assert_eq!(HttpClassifier::extract_verdict(&data), Some("review"));
        assert_eq!(HttpClassifier::extract_verdict(&json!({"ok": true})), None);
    }
}
