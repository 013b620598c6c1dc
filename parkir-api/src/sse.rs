use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use parkir_shared::models::events::{Notification, NotificationEnvelope};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

/// Streams the hub's notifications that pass `wanted`.
///
/// The SSE id is the hub sequence. A subscriber that falls behind gets a
/// `resync` event carrying the number of missed notifications and should
/// reload through the pull routes.
pub fn notification_stream<F>(
    receiver: broadcast::Receiver<NotificationEnvelope>,
    wanted: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&Notification) -> bool + Send + Sync + 'static,
{
    let wanted = Arc::new(wanted);
    let stream = BroadcastStream::new(receiver).filter_map(move |result| {
        let wanted = wanted.clone();
        async move {
            match result {
                Ok(envelope) if wanted(&envelope.notification) => Event::default()
                    .event(envelope.notification.event_name())
                    .id(envelope.seq.to_string())
                    .json_data(&envelope)
                    .ok()
                    .map(Ok),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "SSE subscriber lagged, requesting resync");
                    Some(Ok(Event::default().event("resync").data(missed.to_string())))
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
