//! Server-side broadcast hub.
//!
//! Streaming subscribers receive events through a broadcast channel.
//! Every event is also numbered and kept in a bounded backlog so that
//! long-poll clients, which hold no subscription between requests, can
//! resume from the last sequence number they saw.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use desa_sos_emergency_models::EmergencyEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;

use crate::PollBatch;

/// Default number of events buffered per subscriber before it starts
/// skipping. Also the size of the long-poll backlog.
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts emergency events to every current subscriber.
///
/// Cloning the hub is cheap and every clone publishes to the same set of
/// subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sender: broadcast::Sender<EmergencyEvent>,
    backlog: Mutex<Backlog>,
    latest: watch::Sender<u64>,
}

#[derive(Debug)]
struct Backlog {
    capacity: usize,
    last_seq: u64,
    events: VecDeque<(u64, EmergencyEvent)>,
}

impl Backlog {
    fn push(&mut self, event: EmergencyEvent) -> u64 {
        self.last_seq += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back((self.last_seq, event));
        self.last_seq
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    /// Creates a hub that buffers up to `capacity` events per subscriber
    /// and keeps the last `capacity` events for long-poll clients.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        let (latest, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                sender,
                backlog: Mutex::new(Backlog {
                    capacity,
                    last_seq: 0,
                    events: VecDeque::with_capacity(capacity),
                }),
                latest,
            }),
        }
    }

    fn backlog(&self) -> std::sync::MutexGuard<'_, Backlog> {
        self.inner
            .backlog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes an event to all subscribers and returns how many streaming
    /// subscribers received it. The event is kept in the backlog either
    /// way.
    pub fn publish(&self, event: EmergencyEvent) -> usize {
        let name = event.name();
        let id = event.report_id().to_string();

        let mut backlog = self.backlog();
        let seq = backlog.push(event.clone());
        let sent = self.inner.sender.send(event);
        drop(backlog);
        self.inner.latest.send_replace(seq);

        match sent {
            Ok(receivers) => {
                log::debug!("Broadcast {name} #{seq} for {id} to {receivers} subscriber(s)");
                receivers
            }
            Err(_) => {
                log::debug!("No streaming subscribers for {name} #{seq} on {id}");
                0
            }
        }
    }

    /// Registers a new streaming subscriber. It only sees events published
    /// after this call.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Number of live streaming subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Sequence number of the most recent event, `0` before the first.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.backlog().last_seq
    }

    /// Up to `limit` events published after `cursor`, oldest first.
    ///
    /// A cursor that fell out of the backlog resumes at the oldest event
    /// still kept; the gap is logged.
    #[must_use]
    pub fn since(&self, cursor: u64, limit: usize) -> PollBatch {
        let backlog = self.backlog();

        if let Some(&(oldest, _)) = backlog.events.front()
            && cursor.saturating_add(1) < oldest
        {
            log::warn!(
                "Long-poll cursor {cursor} is behind the backlog, skipped {} event(s)",
                oldest - cursor - 1
            );
        }

        let mut next = cursor.min(backlog.last_seq);
        let events = backlog
            .events
            .iter()
            .filter(|(seq, _)| *seq > cursor)
            .take(limit)
            .map(|(seq, event)| {
                next = *seq;
                event.clone()
            })
            .collect();

        PollBatch {
            cursor: next,
            events,
        }
    }

    /// Waits until an event newer than `cursor` is published or `wait`
    /// elapses. Returns whether one was.
    pub async fn wait_past(&self, cursor: u64, wait: Duration) -> bool {
        let mut latest = self.inner.latest.subscribe();
        tokio::time::timeout(wait, latest.wait_for(|&seq| seq > cursor))
            .await
            .is_ok_and(|changed| changed.is_ok())
    }
}

/// One subscriber's view of the hub, in publish order.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<EmergencyEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the hub is gone.
    ///
    /// A subscriber that falls more than the hub capacity behind skips the
    /// events it missed.
    pub async fn next(&mut self) -> Option<EmergencyEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Realtime subscriber lagged, skipped {skipped} event(s)");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<EmergencyEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("Realtime subscriber lagged, skipped {skipped} event(s)");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
