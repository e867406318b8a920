//! One chat request relayed from the upstream stream to a client connection

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::moderation::ModerationGate;
use crate::quota::QuotaTracker;

use super::frame::ClientFrame;
use super::message::ChatRequest;
use super::registry::ConnectionRegistry;
use super::sse::{self, DecodeError, UpstreamEvent};
use super::upstream::UpstreamClient;

/// Shared privileged credential and the marker that requests it
#[derive(Debug, Clone, Default)]
pub struct SharedCredential {
    pub api_key: Option<String>,
    pub sentinel: String,
}

impl SharedCredential {
    fn is_requested_by(&self, key: &str) -> bool {
        !self.sentinel.is_empty() && key.contains(&self.sentinel)
    }
}

/// Everything a session needs, shared by all sessions of the process
#[derive(Clone)]
pub struct RelayContext {
    pub registry: Arc<ConnectionRegistry>,
    pub quota: Arc<QuotaTracker>,
    pub upstream: UpstreamClient,
    pub moderation: ModerationGate,
    pub credential: SharedCredential,
}

impl RelayContext {
    pub fn from_config(config: &Config) -> Self {
        if config.upstream.api_key.is_none() {
            tracing::warn!("No shared upstream key configured; callers must supply their own");
        }
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            quota: Arc::new(QuotaTracker::new(config.quota.daily_limit)),
            upstream: UpstreamClient::from_config(&config.upstream),
            moderation: ModerationGate::from_config(&config.moderation),
            credential: SharedCredential {
                api_key: config.upstream.api_key.clone(),
                sentinel: config.quota.sentinel.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    CredentialResolved,
    UpstreamRequested,
    Streaming,
    Blocked,
    UpstreamDone,
    UpstreamFailed,
    Terminated,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `[DONE]` received and forwarded.
    Done,
    /// Moderation rejected a fragment and the upstream was aborted.
    Blocked,
    /// Upstream answered with a non-success status.
    UpstreamFailed(u16),
    /// Upstream unreachable or the body read failed.
    TransportFailed,
    /// Upstream closed the body without `[DONE]`.
    StreamEnded,
    /// The client connection went away.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
enum FragmentError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("completion chunk has no choices")]
    NoChoices,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Text carried by one streamed completion chunk. Role-only deltas have none.
fn extract_fragment(payload: &str) -> Result<Option<String>, FragmentError> {
    let chunk: CompletionChunk = serde_json::from_str(payload)?;
    let choice = chunk.choices.into_iter().next().ok_or(FragmentError::NoChoices)?;
    Ok(choice.delta.and_then(|d| d.content))
}

enum FragmentOutcome {
    Continue,
    Blocked,
}

pub struct RelaySession {
    ctx: RelayContext,
    identity: String,
    request: ChatRequest,
    cancel: CancellationToken,
    state: SessionState,
}

impl RelaySession {
    /// `cancel` aborts the upstream stream; pass a child of the connection
    /// token so a disconnect stops the session.
    pub fn new(ctx: RelayContext, identity: &str, request: ChatRequest, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            identity: identity.to_string(),
            request,
            cancel,
            state: SessionState::Idle,
        }
    }

    pub fn spawn(self) -> JoinHandle<SessionOutcome> {
        tokio::spawn(self.run())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!("Session {}: {:?} -> {:?}", self.identity, self.state, next);
        self.state = next;
    }

    fn send(&self, frame: ClientFrame) {
        self.ctx.registry.deliver(&self.identity, &frame);
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        self.transition(SessionState::Terminated);
        tracing::info!("Chat for {} via {} finished: {:?}", self.identity, self.request.action, outcome);
        outcome
    }

    /// The shared key when the caller asks for it and has quota left,
    /// otherwise the caller's own `key` unchanged.
    pub fn resolve_credential(&self) -> String {
        let shared = &self.ctx.credential;
        if !shared.is_requested_by(&self.request.key) {
            return self.request.key.clone();
        }

        match &shared.api_key {
            Some(api_key) if self.ctx.quota.consume(&self.identity) => api_key.clone(),
            Some(_) => {
                tracing::warn!("Quota exhausted for {}, forwarding caller key as-is", self.identity);
                self.request.key.clone()
            }
            None => {
                tracing::warn!("Shared key requested by {} but none configured", self.identity);
                self.request.key.clone()
            }
        }
    }

    pub async fn run(mut self) -> SessionOutcome {
        let credential = self.resolve_credential();
        self.transition(SessionState::CredentialResolved);

        let body = self.request.upstream_body();
        self.transition(SessionState::UpstreamRequested);

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            response = self.ctx.upstream.open_stream(&self.request.action, &credential, &body) => Some(response),
        };

        let response = match response {
            None => return self.finish(SessionOutcome::Cancelled),
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::error!("Upstream request for {} failed: {}", self.identity, e);
                self.send(ClientFrame::fail(500, e.to_string()));
                self.transition(SessionState::UpstreamFailed);
                return self.finish(SessionOutcome::TransportFailed);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Upstream returned {} for {}", status, self.identity);
            let status_text = status.canonical_reason().unwrap_or_default();
            self.send(ClientFrame::fail(status.as_u16(), status_text));
            self.transition(SessionState::UpstreamFailed);
            return self.finish(SessionOutcome::UpstreamFailed(status.as_u16()));
        }

        self.transition(SessionState::Streaming);
        let events = sse::decode_events(response.bytes_stream(), self.cancel.clone());
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            match event {
                Ok(UpstreamEvent::Done) => {
                    self.send(ClientFrame::done());
                    self.transition(SessionState::UpstreamDone);
                    return self.finish(SessionOutcome::Done);
                }
                Ok(UpstreamEvent::Data(payload)) => {
                    if let FragmentOutcome::Blocked = self.relay_fragment(&payload).await {
                        self.cancel.cancel();
                        self.send(ClientFrame::refusal());
                        self.transition(SessionState::Blocked);
                        return self.finish(SessionOutcome::Blocked);
                    }
                }
                Err(DecodeError::Malformed(e)) => {
                    tracing::debug!("Skipping malformed event for {}: {}", self.identity, e);
                    self.send(ClientFrame::event_fail(e));
                }
                Err(DecodeError::Transport(e)) => {
                    tracing::error!("Upstream stream for {} broke: {}", self.identity, e);
                    self.send(ClientFrame::fail(500, e));
                    self.transition(SessionState::UpstreamFailed);
                    return self.finish(SessionOutcome::TransportFailed);
                }
            }
        }

        if self.cancel.is_cancelled() {
            self.finish(SessionOutcome::Cancelled)
        } else {
            self.finish(SessionOutcome::StreamEnded)
        }
    }

    /// Forward one data payload, vetting it first when moderation is on.
    /// Errors are reported for this event only.
    async fn relay_fragment(&self, payload: &str) -> FragmentOutcome {
        let fragment = match extract_fragment(payload) {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::debug!("Unparseable chunk for {}: {}", self.identity, e);
                self.send(ClientFrame::event_fail(e.to_string()));
                return FragmentOutcome::Continue;
            }
        };

        if let Some(text) = fragment.as_deref().filter(|t| !t.is_empty()) {
            let level = self.request.moderation_level.as_deref();
            match self.ctx.moderation.classify(text, level).await {
                Ok(decision) if decision.blocked => return FragmentOutcome::Blocked,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Moderation failed for {}: {}", self.identity, e);
                    self.send(ClientFrame::event_fail(e.to_string()));
                    return FragmentOutcome::Continue;
                }
            }
        }

        self.send(ClientFrame::ok(fragment));
        FragmentOutcome::Continue
    }
}
