use crate::domain::idempotency::IdempotencyKey;
use crate::domain::payment::OutgoingRequest;
use crate::domain::ports::{Delivery, MessageSource, PublishAck, RequestQueue};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Redelivery horizon used when a nak delay does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug)]
struct Envelope {
    sequence: u64,
    payload: Vec<u8>,
    redeliveries: u32,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    delayed: Vec<(Instant, Envelope)>,
    in_flight: usize,
    seen_keys: HashSet<IdempotencyKey>,
    next_sequence: u64,
    acked: u64,
    naked: u64,
}

impl QueueState {
    fn enqueue(&mut self, payload: Vec<u8>) -> u64 {
        self.next_sequence += 1;
        self.ready.push_back(Envelope {
            sequence: self.next_sequence,
            payload,
            redeliveries: 0,
        });
        self.next_sequence
    }

    /// Moves every delayed message whose time has come to the back of the ready queue.
    fn promote_due(&mut self, now: Instant) {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.delayed = pending;
        due.sort_by_key(|(at, envelope)| (*at, envelope.sequence));
        self.ready.extend(due.into_iter().map(|(_, envelope)| envelope));
    }

    fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty() && self.in_flight == 0
    }
}

/// Counters describing what happened on an [`InMemoryQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub queued: usize,
    pub in_flight: usize,
    pub acked: u64,
    pub naked: u64,
}

/// A single-stream broker held in process memory.
///
/// Supports everything the loops rely on: explicit ack, nak with a redelivery
/// delay and counter, and key-based deduplication on publish. Consumers end
/// their subscription once the queue is drained (nothing ready, nothing
/// delayed, nothing unacknowledged), which makes it suitable for replays and
/// tests rather than long-running service.
#[derive(Default, Clone)]
pub struct InMemoryQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw message without a deduplication key.
    pub async fn push(&self, payload: Vec<u8>) -> u64 {
        let sequence = self.state.lock().await.enqueue(payload);
        self.notify.notify_one();
        sequence
    }

    pub async fn push_json<T: Serialize>(&self, value: &T) -> Result<u64> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.push(payload).await)
    }

    /// Opens a consumer over this queue.
    pub fn subscribe(&self) -> InMemoryConsumer {
        InMemoryConsumer {
            queue: self.clone(),
        }
    }

    /// Outgoing requests not yet acknowledged or in flight, in queue order.
    pub async fn pending_requests(&self) -> Result<Vec<OutgoingRequest>> {
        let state = self.state.lock().await;
        state
            .ready
            .iter()
            .chain(state.delayed.iter().map(|(_, envelope)| envelope))
            .map(|envelope| Ok(serde_json::from_slice(&envelope.payload)?))
            .collect()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            queued: state.ready.len() + state.delayed.len(),
            in_flight: state.in_flight,
            acked: state.acked,
            naked: state.naked,
        }
    }

    async fn settle(&self, redeliver: Option<(Instant, Envelope)>) {
        {
            let mut state = self.state.lock().await;
            state.in_flight = state.in_flight.saturating_sub(1);
            match redeliver {
                Some(entry) => {
                    state.naked += 1;
                    state.delayed.push(entry);
                }
                None => state.acked += 1,
            }
        }
        self.notify.notify_one();
    }
}

#[async_trait]
impl RequestQueue for InMemoryQueue {
    async fn publish(&self, request: &OutgoingRequest, key: IdempotencyKey) -> Result<PublishAck> {
        let payload = serde_json::to_vec(request)?;
        let ack = {
            let mut state = self.state.lock().await;
            if !state.seen_keys.insert(key) {
                return Ok(PublishAck {
                    sequence: state.next_sequence,
                    duplicate: true,
                });
            }
            PublishAck {
                sequence: state.enqueue(payload),
                duplicate: false,
            }
        };
        self.notify.notify_one();
        Ok(ack)
    }
}

/// Consumer handle returned by [`InMemoryQueue::subscribe`].
pub struct InMemoryConsumer {
    queue: InMemoryQueue,
}

#[async_trait]
impl MessageSource for InMemoryConsumer {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>>> {
        loop {
            let wake_at = {
                let mut state = self.queue.state.lock().await;
                state.promote_due(Instant::now());

                if let Some(envelope) = state.ready.pop_front() {
                    state.in_flight += 1;
                    let delivery: Box<dyn Delivery> = Box::new(InMemoryDelivery {
                        queue: self.queue.clone(),
                        envelope,
                    });
                    return Some(Ok(delivery));
                }
                if state.is_drained() {
                    return None;
                }
                state.delayed.iter().map(|(at, _)| *at).min()
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = self.queue.notify.notified() => {}
                    }
                }
                None => self.queue.notify.notified().await,
            }
        }
    }
}

struct InMemoryDelivery {
    queue: InMemoryQueue,
    envelope: Envelope,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.envelope.payload
    }

    fn redelivery_count(&self) -> u32 {
        self.envelope.redeliveries
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        self.queue.settle(None).await;
        Ok(())
    }

    async fn nak(self: Box<Self>, delay: Duration) -> Result<()> {
        let Self {
            queue,
            mut envelope,
        } = *self;
        envelope.redeliveries += 1;
        let now = Instant::now();
        let at = now.checked_add(delay).unwrap_or(now + FAR_FUTURE);
        queue.settle(Some((at, envelope))).await;
        Ok(())
    }
}
