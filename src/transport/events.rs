//! Long-lived event stream subscription.
//!
//! One background task owns the HTTP connection. It decodes SSE frames into
//! [`ResourceEvent`]s and forwards them over a bounded channel; on any
//! disconnect it reconnects with exponential backoff (plus jitter) and
//! resumes from the last seen frame id via `Last-Event-ID`.

use super::{error::check_status, BridgeClient, TransportError, APPLICATION_KEY_HEADER};
use crate::event::{parse_frame, ResourceEvent, SseDecoder};
use crate::rate_limit::RequestCategory;
use futures::{Stream, StreamExt};
use rand::Rng;
use reqwest::header;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const EVENT_STREAM_PATH: &str = "/eventstream/clip/v2";

/// Message delivered to the subscriber.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    /// Connection (re)established
    Connected,
    /// One resource change
    Event(ResourceEvent),
    /// Connection lost; a reconnect follows
    Disconnected { reason: String },
    /// Bridge rejected the application key; the stream has stopped for good
    Rejected { reason: String },
}

/// Handle to the running event stream task.
///
/// Implements [`Stream`]; dropping it (or calling [`close`](Self::close))
/// aborts the task, which closes the HTTP connection.
pub struct EventSubscription {
    receiver: ReceiverStream<StreamMessage>,
    handle: JoinHandle<()>,
}

impl EventSubscription {
    /// Next message, or `None` once the stream task has stopped.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.receiver.next().await
    }

    pub fn close(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Stream for EventSubscription {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Per-subscription connection state carried across reconnects.
#[derive(Default)]
struct StreamCursor {
    last_event_id: Option<String>,
    connected: bool,
}

impl BridgeClient {
    /// Open the event stream in a background task.
    pub fn subscribe_events(self: &Arc<Self>) -> EventSubscription {
        let (tx, rx) = mpsc::channel(self.events.channel_capacity.max(1));
        let client = Arc::clone(self);
        let handle = tokio::spawn(async move { client.run_event_stream(tx).await });

        EventSubscription {
            receiver: ReceiverStream::new(rx),
            handle,
        }
    }

    async fn run_event_stream(&self, tx: mpsc::Sender<StreamMessage>) {
        let initial = Duration::from_millis(self.events.initial_backoff_ms.max(1));
        let max = Duration::from_millis(self.events.max_backoff_ms).max(initial);
        let mut backoff = initial;
        let mut cursor = StreamCursor::default();

        info!(base_url = %self.base_url, "Starting bridge event stream");

        loop {
            cursor.connected = false;
            let result = self.stream_once(&tx, &mut cursor).await;

            if tx.is_closed() {
                debug!("Event stream consumer gone, stopping");
                return;
            }

            let reason = match &result {
                Ok(()) => "stream closed by bridge".to_string(),
                Err(e) => e.to_string(),
            };
            let fatal = matches!(&result, Err(e) if e.is_auth());

            if fatal {
                warn!(reason = %reason, "Event stream rejected credentials, giving up");
                let _ = tx.send(StreamMessage::Rejected { reason }).await;
                return;
            }

            if tx
                .send(StreamMessage::Disconnected {
                    reason: reason.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            if cursor.connected {
                backoff = initial;
            }

            let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
            let delay = backoff + Duration::from_millis(jitter_ms);
            warn!(
                reason = %reason,
                delay_ms = delay.as_millis() as u64,
                last_event_id = ?cursor.last_event_id,
                "Event stream disconnected, reconnecting"
            );
            tokio::time::sleep(delay).await;
            backoff = (backoff * 2).min(max);
        }
    }

    /// One connection lifetime. Returns `Ok(())` when the bridge closes the
    /// stream cleanly (or the consumer went away).
    async fn stream_once(
        &self,
        tx: &mpsc::Sender<StreamMessage>,
        cursor: &mut StreamCursor,
    ) -> Result<(), TransportError> {
        self.governor.acquire(RequestCategory::Device).await;

        let url = format!("{}{}", self.base_url, EVENT_STREAM_PATH);
        let mut request = self
            .http
            .get(&url)
            .header(APPLICATION_KEY_HEADER, &self.application_key)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(id) = &cursor.last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;
        check_status(response.status(), EVENT_STREAM_PATH, None, &Value::Null)?;

        cursor.connected = true;
        info!(resume_from = ?cursor.last_event_id, "Event stream connected");
        if tx.send(StreamMessage::Connected).await.is_err() {
            return Ok(());
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(TransportError::from_reqwest)?;
            for frame in decoder.push(&chunk) {
                if let Some(id) = &frame.id {
                    cursor.last_event_id = Some(id.clone());
                }
                for event in parse_frame(&frame) {
                    if tx.send(StreamMessage::Event(event)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}
