// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Subscriber fan-out with non-blocking, evict-on-full back pressure.
//!
//! A `broadcast` channel cannot single out one slow receiver; everyone pays
//! for the slowest subscriber or the channel silently drops frames for all
//! of them. Instead each subscriber gets its own bounded `mpsc` channel, and
//! a full channel means *that* subscriber is too slow and gets dropped from
//! the registry, not that the tick is delayed for everyone else.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Per-subscriber channel capacity. A subscriber that can't keep up with one
/// radar tick's worth of backlog is evicted rather than stalling publish.
pub const CHANNEL_CAPACITY: usize = 16;

/// An encoded, ready-to-send event payload (compact JSON).
pub type Payload = String;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Payload>>,
}

/// Registry of live subscriber channels for one session.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its id plus the receiving end
    /// of its channel.
    pub fn add(&self) -> (u64, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        (id, rx)
    }

    /// Remove a subscriber, e.g. when its HTTP connection closes.
    pub fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.subscribers.remove(&id);
    }

    /// Broadcast one payload to every subscriber under a single lock,
    /// evicting any whose channel is full or already closed.
    pub fn publish(&self, payload: Payload) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut to_evict = Vec::new();

        for (&id, tx) in &inner.subscribers {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("evicting subscriber {id}: channel full");
                    to_evict.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    to_evict.push(id);
                }
            }
        }

        for id in to_evict {
            inner.subscribers.remove(&id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subscribers
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers() {
        let registry = SubscriberRegistry::new();
        let (_id_a, mut rx_a) = registry.add();
        let (_id_b, mut rx_b) = registry.add();

        registry.publish("hello".to_string());

        assert_eq!(rx_a.recv().await, Some("hello".to_string()));
        assert_eq!(rx_b.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn remove_stops_delivery() {
        let registry = SubscriberRegistry::new();
        let (id, mut rx) = registry.add();
        registry.remove(id);

        registry.publish("hello".to_string());
        assert_eq!(rx.recv().await, None);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_on_full_channel() {
        let registry = SubscriberRegistry::new();
        let (_fast_id, mut fast_rx) = registry.add();
        let (_slow_id, _slow_rx) = registry.add(); // never drained

        for i in 0..CHANNEL_CAPACITY + 1 {
            registry.publish(format!("tick-{i}"));
        }

        // The slow subscriber's channel filled up and it was dropped from
        // the registry; only the fast one remains.
        assert_eq!(registry.len(), 1);

        let mut received = Vec::new();
        while let Ok(payload) = fast_rx.try_recv() {
            received.push(payload);
        }
        assert!(!received.is_empty());
    }

    #[tokio::test]
    async fn closed_receiver_is_evicted_on_next_publish() {
        let registry = SubscriberRegistry::new();
        let (_id, rx) = registry.add();
        drop(rx);

        registry.publish("hello".to_string());
        assert_eq!(registry.len(), 0);
    }
}
