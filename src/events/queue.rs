//! Batch event queue and background worker (4.10). Producers (`get_flag`,
//! `track_event`, `set_attribute`) never block on network: they `try_send`
//! onto a bounded channel and a single background task drains it, batching
//! by size or by timer before handing off to the [`EventTransport`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::interval;

use crate::events::payload::QueuedEvent;
use crate::transport::{BatchEventRequest, EventTransport};

#[derive(Debug, Clone)]
pub struct BatchEventOptions {
    pub events_per_request: usize,
    pub request_time_interval: Duration,
}

impl Default for BatchEventOptions {
    fn default() -> Self {
        Self {
            events_per_request: crate::constants::DEFAULT_EVENTS_PER_REQUEST as usize,
            request_time_interval: Duration::from_secs(crate::constants::DEFAULT_REQUEST_TIME_INTERVAL_SECS),
        }
    }
}

enum WorkerMessage {
    Event(Value),
    Flush(oneshot::Sender<bool>),
    Shutdown,
}

pub struct EventQueue {
    sender: mpsc::Sender<WorkerMessage>,
    events_dropped: Arc<AtomicU64>,
    events_flushed: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn start(
        options: BatchEventOptions,
        transport: Arc<dyn EventTransport>,
        host: String,
        account_id: String,
        sdk_key: String,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(4096);
        let events_dropped = Arc::new(AtomicU64::new(0));
        let events_flushed = Arc::new(AtomicU64::new(0));

        tokio::spawn(run_worker(
            receiver,
            options,
            transport,
            host,
            account_id,
            sdk_key,
            events_flushed.clone(),
        ));

        Self { sender, events_dropped, events_flushed }
    }

    pub fn enqueue(&self, event: QueuedEvent) {
        let payload = match event {
            QueuedEvent::Impression(e) => serde_json::to_value(e).unwrap_or_default(),
            QueuedEvent::Track(e) => serde_json::to_value(e).unwrap_or_default(),
            QueuedEvent::Attribute(e) => serde_json::to_value(e).unwrap_or_default(),
        };
        if self.sender.try_send(WorkerMessage::Event(payload)).is_err() {
            self.events_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("event queue full, dropping event");
        }
    }

    pub async fn flush(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WorkerMessage::Flush(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn events_flushed(&self) -> u64 {
        self.events_flushed.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(WorkerMessage::Shutdown).await;
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<WorkerMessage>,
    options: BatchEventOptions,
    transport: Arc<dyn EventTransport>,
    host: String,
    account_id: String,
    sdk_key: String,
    events_flushed: Arc<AtomicU64>,
) {
    let batch: Mutex<Vec<Value>> = Mutex::new(Vec::new());
    let mut ticker = interval(options.request_time_interval);

    loop {
        tokio::select! {
            msg = receiver.recv() => {
                match msg {
                    Some(WorkerMessage::Event(event)) => {
                        let mut guard = batch.lock().await;
                        guard.push(event);
                        if guard.len() >= options.events_per_request {
                            let drained: Vec<Value> = guard.drain(..).collect();
                            drop(guard);
                            flush_batch(&transport, &host, &account_id, &sdk_key, drained, &events_flushed).await;
                        }
                    }
                    Some(WorkerMessage::Flush(ack)) => {
                        let mut guard = batch.lock().await;
                        let drained: Vec<Value> = guard.drain(..).collect();
                        drop(guard);
                        flush_batch(&transport, &host, &account_id, &sdk_key, drained, &events_flushed).await;
                        let _ = ack.send(true);
                    }
                    Some(WorkerMessage::Shutdown) | None => break,
                }
            }
            _ = ticker.tick() => {
                let mut guard = batch.lock().await;
                if guard.is_empty() {
                    continue;
                }
                let drained: Vec<Value> = guard.drain(..).collect();
                drop(guard);
                flush_batch(&transport, &host, &account_id, &sdk_key, drained, &events_flushed).await;
            }
        }
    }
}

async fn flush_batch(
    transport: &Arc<dyn EventTransport>,
    host: &str,
    account_id: &str,
    sdk_key: &str,
    events: Vec<Value>,
    events_flushed: &Arc<AtomicU64>,
) {
    if events.is_empty() {
        return;
    }
    let count = events.len() as u64;
    let req = BatchEventRequest {
        host: host.to_string(),
        account_id: account_id.to_string(),
        sdk_key: sdk_key.to_string(),
        events,
    };

    let mut backoff = Duration::from_secs(crate::constants::RETRY_INITIAL_BACKOFF_SECS);
    for attempt in 0..crate::constants::RETRY_MAX_ATTEMPTS {
        match transport.send_batch(req.clone()).await {
            Ok(()) => {
                events_flushed.fetch_add(count, Ordering::Relaxed);
                tracing::debug!(count, "flushed event batch");
                return;
            }
            Err(err) if attempt + 1 < crate::constants::RETRY_MAX_ATTEMPTS => {
                tracing::warn!(%err, attempt, "event batch flush failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                tracing::warn!(%err, "event batch flush failed permanently, dropping batch");
            }
        }
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::AtomicUsize;

    struct CountingTransport(AtomicUsize);

    #[async_trait::async_trait]
    impl EventTransport for CountingTransport {
        async fn send_batch(&self, req: BatchEventRequest) -> Result<(), CoreError> {
            self.0.fetch_add(req.events.len(), Ordering::Relaxed);
            Ok(())
        }
    }

    #[tokio::test]
    async fn flush_drains_pending_events() {
        let transport = Arc::new(CountingTransport(AtomicUsize::new(0)));
        let queue = EventQueue::start(
            BatchEventOptions { events_per_request: 1000, request_time_interval: Duration::from_secs(600) },
            transport.clone(),
            "https://example.com".into(),
            "acc".into(),
            "key".into(),
        );
        queue.enqueue(QueuedEvent::Track(crate::events::payload::TrackEvent {
            event_name: "purchase".into(),
            vis_id: "v1".into(),
            session_id: 1,
            time_ms: 0,
            properties: Default::default(),
        }));
        assert!(queue.flush().await);
        assert_eq!(transport.0.load(Ordering::Relaxed), 1);
    }
}
