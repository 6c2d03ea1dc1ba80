//! Server-Sent Events support

use crate::fanout::{Subscription, SubscriptionHandle};
use crate::runtime::SessionRegistry;
use crate::session::{SessionEvent, SessionView};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

/// Removes the fanout entry when the client goes away
struct SubscriptionGuard {
    registry: Arc<SessionRegistry>,
    handle: SubscriptionHandle,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.handle);
        tracing::debug!(
            session_id = %self.handle.session_id,
            subscriber = self.handle.id,
            "Stream closed"
        );
    }
}

/// `init` snapshot followed by live session events. The stream ends when the
/// session's subscribers are dropped, which follows `closed`.
pub fn sse_stream(
    registry: Arc<SessionRegistry>,
    subscription: Subscription,
    snapshot: SessionView,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = stream::once(async move { Ok(init_event(&snapshot)) });

    let guard = SubscriptionGuard {
        registry,
        handle: subscription.handle,
    };
    let events = ReceiverStream::new(subscription.rx).map(move |event| {
        let _guard = &guard;
        Ok(session_event_to_axum(&event))
    });

    Sse::new(init.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn init_event(snapshot: &SessionView) -> Event {
    let data = json!({
        "type": "init",
        "conversation": snapshot,
    });
    Event::default().event("init").data(data.to_string())
}

fn session_event_to_axum(event: &SessionEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize event");
        json!({ "type": "error", "message": "event serialization failed" }).to_string()
    });
    Event::default().event(event.kind()).data(data)
}
