//! ## lyssna-core::observer
//! Fire-and-forget event fan-out over `tokio::sync::broadcast`.
//!
//! Emitting never blocks. A subscriber that falls more than `capacity` events
//! behind loses the oldest ones and is told so through a `warn!`.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Producer side of an event stream.
#[derive(Debug)]
pub struct Observer<T> {
    name: &'static str,
    sender: broadcast::Sender<T>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone> Observer<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { name, sender }
    }

    /// Delivers `event` to every current subscriber and returns how many
    /// there were.
    pub fn emit(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            name: self.name,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Consumer side of an event stream.
#[derive(Debug)]
pub struct Subscription<T> {
    name: &'static str,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Waits for the next event. Returns `None` once every `Observer` handle
    /// has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(observer = self.name, skipped, "Subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(observer = self.name, skipped, "Subscriber lagging, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    async fn emit_reaches_every_subscriber() {
        let observer = Observer::new("test", 8);
        let mut a = observer.subscribe();
        let mut b = observer.subscribe();
        assert_eq!(observer.emit(7u32), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[test]
    fn emit_without_subscribers_is_dropped() {
        let observer: Observer<u32> = Observer::new("test", 8);
        assert_eq!(observer.emit(1), 0);
    }

    #[tokio::test]
    async fn closed_when_observer_dropped() {
        let observer: Observer<u32> = Observer::new("test", 8);
        let mut sub = observer.subscribe();
        drop(observer);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    #[traced_test]
    fn slow_subscriber_skips_ahead() {
        let observer = Observer::new("packets", 2);
        let mut sub = observer.subscribe();
        for i in 0..5u32 {
            observer.emit(i);
        }
        assert_eq!(sub.try_recv(), Some(3));
        assert_eq!(sub.try_recv(), Some(4));
        assert_eq!(sub.try_recv(), None);
        assert!(logs_contain("Subscriber lagging"));
    }
}
