//! Bounded per-connection outbound queue
//!
//! Handlers enqueue frames here and the connection's write loop drains them.
//! What happens when the queue is full is decided by [`SendPolicy`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::trace;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::codec::Message;
use crate::error::{RealmError, Result};

/// Behaviour of `send` when the outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Wait for room, up to the given bound, then fail with `CapacityExceeded`
    Backpressure(Duration),
    /// Fail immediately with `CapacityExceeded`
    Reject,
    /// Evict the oldest queued message to make room
    DropOldest,
}

impl SendPolicy {
    /// Parse a policy name as used in the environment configuration
    pub fn parse(raw: &str, timeout: Duration) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "backpressure" | "block" => Ok(Self::Backpressure(timeout)),
            "reject" => Ok(Self::Reject),
            "drop_oldest" | "drop-oldest" => Ok(Self::DropOldest),
            other => Err(RealmError::Config(format!(
                "unknown send policy '{}', expected backpressure, reject or drop_oldest",
                other
            ))),
        }
    }
}

struct QueueState {
    items: VecDeque<Message>,
    closed: bool,
    dropped: u64,
}

/// FIFO of frames waiting to be written to one peer
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: SendPolicy,
    readable: Notify,
    writable: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: SendPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
                dropped: 0,
            }),
            capacity,
            policy,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Queue state stays consistent across a panic; keep serving it
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a message according to the configured policy
    pub async fn push(&self, message: Message) -> Result<()> {
        match self.policy {
            SendPolicy::Reject => {
                let mut state = self.lock();
                if state.closed {
                    return Err(RealmError::ConnectionClosed);
                }
                if state.items.len() >= self.capacity {
                    return Err(RealmError::CapacityExceeded(self.capacity));
                }
                state.items.push_back(message);
            }
            SendPolicy::DropOldest => {
                let mut state = self.lock();
                if state.closed {
                    return Err(RealmError::ConnectionClosed);
                }
                if state.items.len() >= self.capacity {
                    if let Some(evicted) = state.items.pop_front() {
                        trace!("Outbound queue full, dropping message with tag {}", evicted.tag);
                    }
                    state.dropped += 1;
                }
                state.items.push_back(message);
            }
            SendPolicy::Backpressure(wait) => {
                let deadline = Instant::now() + wait;
                let mut message = Some(message);
                loop {
                    let notified = self.writable.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    {
                        let mut state = self.lock();
                        if state.closed {
                            return Err(RealmError::ConnectionClosed);
                        }
                        if state.items.len() < self.capacity {
                            if let Some(message) = message.take() {
                                state.items.push_back(message);
                            }
                            break;
                        }
                    }

                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(RealmError::CapacityExceeded(self.capacity));
                    }
                }
            }
        }

        self.readable.notify_one();
        Ok(())
    }

    /// Wait for the next message. Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(message) = state.items.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next message without waiting
    pub fn try_pop(&self) -> Option<Message> {
        let message = self.lock().items.pop_front();
        if message.is_some() {
            self.writable.notify_one();
        }
        message
    }

    /// Refuse further pushes. Already queued messages can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> SendPolicy {
        self.policy
    }

    /// Messages evicted under `DropOldest`
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }
}
