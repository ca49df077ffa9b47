//! In-process broker with RabbitMQ delivery semantics
//!
//! Messages wait in FIFO order per queue. A delivery stays unacknowledged
//! until it is acked or nacked; nack with requeue puts it back at the head
//! of its queue flagged as redelivered. Each consumer respects its prefetch
//! window. Closing the broker returns every unacked delivery to its queue
//! and ends all consumer streams.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

use super::{BrokerError, BrokerResult, Delivery, DeliveryStream, DeliveryTag, MessageBroker};

#[derive(Debug)]
struct Ready {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct Unacked {
    queue: String,
    body: Vec<u8>,
    consumer: u64,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<Ready>>,
    unacked: HashMap<DeliveryTag, Unacked>,
    closed: bool,
}

impl State {
    fn in_flight(&self, consumer: u64) -> usize {
        self.unacked
            .values()
            .filter(|u| u.consumer == consumer)
            .count()
    }

    fn requeue(&mut self, unacked: Unacked) {
        if let Some(queue) = self.queues.get_mut(&unacked.queue) {
            queue.push_front(Ready {
                body: unacked.body,
                redelivered: true,
            });
        }
    }
}

enum Poll {
    Deliver(Delivery),
    Wait,
    Finished,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    changed: Notify,
    next_tag: AtomicU64,
    next_consumer: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-operation.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn poll_delivery(&self, queue: &str, consumer: u64, prefetch: u16) -> Poll {
        let mut state = self.lock();
        if state.closed {
            return Poll::Finished;
        }
        if prefetch > 0 && state.in_flight(consumer) >= usize::from(prefetch) {
            return Poll::Wait;
        }

        let Some(ready) = state.queues.get_mut(queue).and_then(|q| q.pop_front()) else {
            return Poll::Wait;
        };

        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        state.unacked.insert(
            tag,
            Unacked {
                queue: queue.to_string(),
                body: ready.body.clone(),
                consumer,
            },
        );

        Poll::Deliver(Delivery {
            tag,
            body: ready.body,
            redelivered: ready.redelivered,
        })
    }
}

/// In-memory [`MessageBroker`]. Cloning yields another handle to the same
/// queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bodies currently waiting in `queue`, head first.
    pub fn ready_messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().map(|r| r.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliveries handed out but not yet acked or nacked, across all queues.
    pub fn unacked_count(&self) -> usize {
        self.inner.lock().unacked.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn declare_durable_queue(&self, queue: &str) -> BrokerResult<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let ready = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
            ready.push_back(Ready {
                body: body.to_vec(),
                redelivered: false,
            });
        }
        debug!(queue, bytes = body.len(), "Published to in-memory queue");
        self.inner.changed.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> BrokerResult<DeliveryStream> {
        {
            let state = self.inner.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::UnknownQueue(queue.to_string()));
            }
        }

        let consumer = self.inner.next_consumer.fetch_add(1, Ordering::SeqCst);
        let seed = (self.inner.clone(), queue.to_string());

        let deliveries = stream::unfold(seed, move |(inner, queue)| async move {
            loop {
                let outcome = {
                    // Registered before polling so a publish in between is not missed.
                    let changed = inner.changed.notified();
                    tokio::pin!(changed);
                    changed.as_mut().enable();

                    let outcome = inner.poll_delivery(&queue, consumer, prefetch);
                    if matches!(outcome, Poll::Wait) {
                        changed.await;
                    }
                    outcome
                };

                match outcome {
                    Poll::Deliver(delivery) => return Some((Ok(delivery), (inner, queue))),
                    Poll::Finished => return None,
                    Poll::Wait => continue,
                }
            }
        });

        Ok(deliveries.boxed())
    }

    async fn ack(&self, tag: DeliveryTag) -> BrokerResult<()> {
        self.inner
            .lock()
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))?;
        self.inner.changed.notify_waiters();
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> BrokerResult<()> {
        {
            let mut state = self.inner.lock();
            let unacked = state
                .unacked
                .remove(&tag)
                .ok_or(BrokerError::UnknownDelivery(tag))?;
            if requeue {
                state.requeue(unacked);
            }
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        {
            let mut state = self.inner.lock();
            state.closed = true;
            let pending: Vec<Unacked> = state.unacked.drain().map(|(_, u)| u).collect();
            for unacked in pending {
                state.requeue(unacked);
            }
        }
        self.inner.changed.notify_waiters();
        Ok(())
    }
}
