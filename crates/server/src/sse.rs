//! SSE framing for `POST /ask/stream` (§6): one axum `Event` per
//! [`crate::orchestrator::OrchestratorEvent`], named after its serde tag so
//! the wire format matches `event: <type>\ndata: <json>\n\n` exactly.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::Event;
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::orchestrator::OrchestratorEvent;

/// Wraps the event stream with a [`DropGuard`] so that when axum drops the
/// SSE response body — which is what happens on client disconnect, since
/// nothing else ever stops this stream — `cancel` fires. A bare
/// `CancellationToken` does not cancel on drop; only its `DropGuard` does.
struct GuardedStream<S> {
    inner: S,
    _guard: DropGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

/// Event name sent on the wire, matching the `#[serde(tag = "type")]` value.
fn event_name(event: &OrchestratorEvent) -> &'static str {
    match event {
        OrchestratorEvent::ConnectionOpened { .. } => "connection_opened",
        OrchestratorEvent::Chunk { .. } => "chunk",
        OrchestratorEvent::Citations { .. } => "citations",
        OrchestratorEvent::Metadata { .. } => "metadata",
        OrchestratorEvent::ResponseCompleted { .. } => "response_completed",
        OrchestratorEvent::Error { .. } => "error",
        OrchestratorEvent::Done => "done",
    }
}

/// Turn the channel the orchestrator writes to into the stream axum's SSE
/// response body consumes. A serialization failure here would be an
/// internal-invariant bug (every variant round-trips through `serde_json`),
/// so it is logged and the event dropped rather than ending the stream.
///
/// `cancel` is the token the orchestrator task checks at every suspension
/// point; wrapping the stream in its [`DropGuard`] is what actually ties
/// client disconnect to cancellation (§5, §7's `CLIENT_DISCONNECTED` path) —
/// see [`GuardedStream`].
pub fn event_stream(
    rx: tokio::sync::mpsc::Receiver<OrchestratorEvent>,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<Event, std::convert::Infallible>> {
    let inner = ReceiverStream::new(rx).filter_map(|event| {
        let name = event_name(&event);
        match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(Event::default().event(name).data(data))),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize orchestrator event");
                None
            }
        }
    });
    GuardedStream { inner, _guard: cancel.drop_guard() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_tags() {
        assert_eq!(event_name(&OrchestratorEvent::Done), "done");
        assert_eq!(
            event_name(&OrchestratorEvent::ConnectionOpened { query_id: "q".to_string() }),
            "connection_opened"
        );
    }
}
