//! The Event Bus (spec §4.5): a bounded, non-blocking publish/subscribe
//! channel for `RouterEvent`s.
//!
//! A single dispatcher task owns the main channel and fans each event out
//! to one queue per subscriber; each subscriber is serviced by its own
//! long-lived `tokio::spawn`ed task so a panicking callback cannot affect
//! any other subscriber, and events delivered to one subscriber from a
//! single publisher stay in publish order (spec §5: the bus's subscriber
//! map is guarded by its own mutex, the main channel is single-producer-
//! multiple-consumer per publisher).
//!
//! Delivery is best-effort: both the main channel and every per-subscriber
//! queue are fixed-capacity and drop new events when full rather than
//! block the publisher. There is no replay and no durability, per spec.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use routectl_types::RouterEvent;
use tokio::sync::mpsc;

/// Default bound for the main channel and each subscriber queue.
pub const DEFAULT_CAPACITY: usize = 256;

type Callback = dyn Fn(&RouterEvent) + Send + Sync + 'static;

struct Subscriber {
    tx: mpsc::Sender<RouterEvent>,
}

pub struct EventBus {
    tx: mpsc::Sender<RouterEvent>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RouterEvent>(capacity);
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatch_subscribers = Arc::clone(&subscribers);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let fanout = { dispatch_subscribers.lock().unwrap().iter().map(|s| s.tx.clone()).collect::<Vec<_>>() };
                for sub_tx in fanout {
                    // Best-effort per subscriber too: a slow subscriber's
                    // full queue drops new events rather than stalling
                    // delivery to everyone else.
                    let _ = sub_tx.try_send(event.clone());
                }
            }
        });

        Self { tx, subscribers, capacity }
    }

    /// Register a callback invoked for every subsequently published event.
    /// Delivery to this subscriber runs on a dedicated task, so callbacks
    /// may block without affecting the dispatcher or other subscribers.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<RouterEvent>(self.capacity);
        let callback: Arc<Callback> = Arc::new(callback);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let _ = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
            }
        });

        self.subscribers.lock().unwrap().push(Subscriber { tx });
    }

    /// Non-blocking publish. Returns `true` if the event was enqueued on
    /// the main channel, `false` if it was dropped because the channel
    /// was full or the dispatcher has shut down.
    pub fn publish(&self, event: RouterEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
