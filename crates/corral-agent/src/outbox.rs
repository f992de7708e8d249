//! Bounded queue for messages written while the host connection is down.
//!
//! Fire-and-forget traffic (approval and question requests above all) must
//! not vanish during a reconnect window; it queues here and drains when the
//! channel comes back. Expired or overflowing entries are dropped oldest
//! first.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use corral_shared::protocol::BridgeMessage;

const MAX_ITEMS: usize = 256;
const MAX_AGE: Duration = Duration::from_secs(15 * 60);

struct QueuedItem {
    message: BridgeMessage,
    enqueued_at: Instant,
}

#[derive(Default)]
pub struct Outbox {
    queue: VecDeque<QueuedItem>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, message: BridgeMessage) {
        self.prune_expired();
        while self.queue.len() >= MAX_ITEMS {
            if self.queue.pop_front().is_none() {
                break;
            }
        }
        self.queue.push_back(QueuedItem {
            message,
            enqueued_at: Instant::now(),
        });
    }

    pub fn drain(&mut self) -> Vec<BridgeMessage> {
        self.prune_expired();
        self.queue.drain(..).map(|i| i.message).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.queue.front() {
            if now.duration_since(front.enqueued_at) > MAX_AGE {
                self.queue.pop_front();
            } else {
                break;
            }
        }
    }
}
