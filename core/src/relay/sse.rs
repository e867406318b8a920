//! Incremental server-sent-events decoding of an upstream response body

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Data payload that marks the end of a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Raw `data:` payload, not yet parsed.
    Data(String),
    Done,
}

impl UpstreamEvent {
    pub fn from_data(data: String) -> Self {
        if data == DONE_SENTINEL {
            Self::Done
        } else {
            Self::Data(data)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A record that could not be framed (bad UTF-8, bad field syntax).
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Reading the body failed.
    #[error("upstream read failed: {0}")]
    Transport(String),
}

/// Stop pulling chunks once `cancel` fires. Checked before every read.
fn until_cancelled<S>(body: S, cancel: CancellationToken) -> impl Stream<Item = S::Item> + Send
where
    S: Stream + Send + 'static,
    S::Item: Send,
{
    async_stream::stream! {
        futures::pin_mut!(body);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(chunk) => yield chunk,
                None => break,
            }
        }
    }
}

/// Turn a chunked byte stream into ordered upstream events.
///
/// Partial records are buffered until their terminating blank line arrives,
/// so chunk boundaries may fall anywhere. Payloads are passed through
/// verbatim apart from the `[DONE]` sentinel. One decoder per response.
pub fn decode_events<S, B, E>(
    body: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<UpstreamEvent, DecodeError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    until_cancelled(body, cancel)
        .eventsource()
        .map(|item| match item {
            Ok(event) => Ok(UpstreamEvent::from_data(event.data)),
            Err(EventStreamError::Transport(e)) => Err(DecodeError::Transport(e.to_string())),
            Err(other) => Err(DecodeError::Malformed(other.to_string())),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    const EVENT: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";

    async fn collect(chunks: Vec<String>) -> Vec<UpstreamEvent> {
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        decode_events(body, CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn split_event_decodes_like_the_whole() {
        let whole = collect(vec![EVENT.to_string()]).await;
        assert_eq!(whole.len(), 1);

        for split in 1..EVENT.len() {
            let chunks = vec![EVENT[..split].to_string(), EVENT[split..].to_string()];
            assert_eq!(collect(chunks).await, whole, "split at {split}");
        }

        let bytewise: Vec<String> = EVENT.chars().map(|c| c.to_string()).collect();
        assert_eq!(collect(bytewise).await, whole);
    }

    #[tokio::test]
    async fn payload_is_verbatim() {
        let events = collect(vec!["data: not json at all\n\n".to_string()]).await;
        assert_eq!(events, vec![UpstreamEvent::Data("not json at all".to_string())]);
    }

    #[tokio::test]
    async fn done_is_a_control_signal() {
        let events = collect(vec![
            format!("{EVENT}data: [DONE]\n\n"),
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], UpstreamEvent::Data(_)));
        assert_eq!(events[1], UpstreamEvent::Done);
    }

    #[tokio::test]
    async fn several_events_in_one_chunk_keep_order() {
        let events = collect(vec![
            "data: one\n\ndata: two\n\nda".to_string(),
            "ta: three\n\n".to_string(),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                UpstreamEvent::Data("one".into()),
                UpstreamEvent::Data("two".into()),
                UpstreamEvent::Data("three".into()),
            ]
        );
    }

    #[tokio::test]
    async fn transport_errors_surface_as_decode_errors() {
        let body = stream::iter(vec![
            Ok("data: one\n\n".to_string()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let items: Vec<_> = decode_events(body, CancellationToken::new()).collect().await;
        assert_eq!(items[0], Ok(UpstreamEvent::Data("one".into())));
        assert!(matches!(items[1], Err(DecodeError::Transport(_))));
    }

    #[tokio::test]
    async fn cancellation_stops_reading() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<String, std::io::Error>>();
        let cancel = CancellationToken::new();
        let events = decode_events(rx, cancel.clone());
        futures::pin_mut!(events);

        tx.unbounded_send(Ok("data: first\n\n".to_string())).unwrap();
        assert_eq!(events.next().await, Some(Ok(UpstreamEvent::Data("first".into()))));

        cancel.cancel();
        tx.unbounded_send(Ok("data: second\n\n".to_string())).unwrap();
        assert_eq!(events.next().await, None);
    }
}
