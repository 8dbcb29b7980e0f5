//! Bounded receive queue between a transport's reader task and its consumer.
//!
//! States are capped at `capacity`; when a new state arrives at a full queue
//! the oldest queued state is evicted, so the newest frame (usually the reply
//! being waited on) is always kept. Failures are never evicted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use crate::transport::Inbound;

struct Queue {
    items: VecDeque<Inbound>,
    states: usize,
    sender_gone: bool,
    receiver_gone: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    capacity: usize,
    ready: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a connected sender/receiver pair.
pub fn inbox(capacity: usize) -> (InboxSender, InboxReceiver) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue {
            items: VecDeque::with_capacity(capacity),
            states: 0,
            sender_gone: false,
            receiver_gone: false,
        }),
        capacity,
        ready: Notify::new(),
    });
    (
        InboxSender {
            shared: shared.clone(),
        },
        InboxReceiver { shared },
    )
}

pub struct InboxSender {
    shared: Arc<Shared>,
}

impl InboxSender {
    /// Queue one item. Returns false once the receiver is gone.
    pub fn push(&self, item: Inbound) -> bool {
        {
            let mut q = self.shared.lock();
            if q.receiver_gone {
                return false;
            }
            if matches!(item, Inbound::State(_)) {
                if q.states >= self.shared.capacity {
                    if let Some(at) = q.items.iter().position(|i| matches!(i, Inbound::State(_))) {
                        q.items.remove(at);
                        q.states -= 1;
                        debug!("receive queue full, evicted oldest state");
                    }
                }
                q.states += 1;
            }
            q.items.push_back(item);
        }
        self.shared.ready.notify_one();
        true
    }
}

impl Drop for InboxSender {
    fn drop(&mut self) {
        self.shared.lock().sender_gone = true;
        self.shared.ready.notify_one();
    }
}

pub struct InboxReceiver {
    shared: Arc<Shared>,
}

impl InboxReceiver {
    /// Next item, waiting if none is queued. `None` once the sender is gone
    /// and the queue is drained.
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.shared.lock().sender_gone {
                return None;
            }
            self.shared.ready.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Inbound> {
        let mut q = self.shared.lock();
        let item = q.items.pop_front()?;
        if matches!(item, Inbound::State(_)) {
            q.states -= 1;
        }
        Some(item)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InboxReceiver {
    fn drop(&mut self) {
        self.shared.lock().receiver_gone = true;
    }
}
