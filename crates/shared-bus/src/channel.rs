//! # Paired Channels
//!
//! A [`channel_pair`] is two crossed bounded queues: whatever one end sends,
//! the other end receives. The ends are `Send`, so one can be moved onto a
//! worker thread running its own runtime.

use crate::BusError;
use tokio::sync::mpsc;

/// Create two connected channel ends, each buffering up to `capacity` items
/// in flight towards it.
#[must_use]
pub fn channel_pair<T: Send + 'static>(capacity: usize) -> (ChannelEnd<T>, ChannelEnd<T>) {
    let capacity = capacity.max(1);
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        ChannelEnd {
            tx: ChannelSender { inner: a_tx },
            rx: ChannelReceiver { inner: a_rx },
        },
        ChannelEnd {
            tx: ChannelSender { inner: b_tx },
            rx: ChannelReceiver { inner: b_rx },
        },
    )
}

/// One side of a [`channel_pair`].
#[derive(Debug)]
pub struct ChannelEnd<T> {
    tx: ChannelSender<T>,
    rx: ChannelReceiver<T>,
}

impl<T: Send + 'static> ChannelEnd<T> {
    /// Send an item to the other end, waiting while its queue is full.
    pub async fn send(&self, item: T) -> Result<(), BusError> {
        self.tx.send(item).await
    }

    /// Receive the next item from the other end. `None` once the other end
    /// has dropped its sender and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Split into independently owned halves.
    #[must_use]
    pub fn split(self) -> (ChannelSender<T>, ChannelReceiver<T>) {
        (self.tx, self.rx)
    }
}

/// Sending half of a [`ChannelEnd`].
#[derive(Debug)]
pub struct ChannelSender<T> {
    inner: mpsc::Sender<T>,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> ChannelSender<T> {
    /// Send, waiting for queue space.
    pub async fn send(&self, item: T) -> Result<(), BusError> {
        self.inner.send(item).await.map_err(|_| BusError::Closed)
    }

    /// Send from synchronous code without waiting; fails when full or closed.
    pub fn try_send(&self, item: T) -> Result<(), BusError> {
        self.inner.try_send(item).map_err(|_| BusError::Closed)
    }

    /// True once the receiving side is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Receiving half of a [`ChannelEnd`].
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    inner: mpsc::Receiver<T>,
}

impl<T: Send + 'static> ChannelReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.inner.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_crossed() {
        let (mut a, mut b) = channel_pair::<u32>(4);
        a.send(1).await.unwrap();
        b.send(2).await.unwrap();
        assert_eq!(b.recv().await, Some(1));
        assert_eq!(a.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_dropped() {
        let (a, b) = channel_pair::<u32>(4);
        let (_tx, mut rx) = b.split();
        drop(a);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_fails_after_peer_dropped() {
        let (a, b) = channel_pair::<u32>(4);
        drop(b);
        assert_eq!(a.send(7).await, Err(BusError::Closed));
    }
}
