//! # Control Bus
//!
//! Topic-filtered publish/subscribe over any [`BusAdapter`].

use crate::adapter::{BusAdapter, ChannelBusAdapter, InProcBusAdapter};
use crate::channel::ChannelEnd;
use crate::message::{ControlEnvelope, ControlMessage};
use crate::BusError;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Control-plane bus handle. Cheap to clone.
#[derive(Clone)]
pub struct ControlBus {
    adapter: Arc<dyn BusAdapter>,
}

impl ControlBus {
    pub fn new(adapter: Arc<dyn BusAdapter>) -> Self {
        Self { adapter }
    }

    /// A bus local to this process.
    #[must_use]
    pub fn in_proc() -> Self {
        Self::new(Arc::new(InProcBusAdapter::new()))
    }

    /// A bus whose remote side is the other end of `end`'s pair.
    ///
    /// Must be called inside a tokio runtime.
    pub fn over_channel(end: ChannelEnd<ControlEnvelope>) -> Self {
        Self::new(Arc::new(ChannelBusAdapter::new(end)))
    }

    /// Publish `message` on `topic`.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        message: ControlMessage,
    ) -> Result<usize, BusError> {
        self.adapter
            .publish(ControlEnvelope::new(topic, message))
            .await
    }

    /// Receive messages published on `topic` from now on.
    #[must_use]
    pub fn subscribe(&self, topic: impl Into<String>) -> ControlSubscription {
        let topic = topic.into();
        debug!(topic = %topic, "Control subscription created");
        ControlSubscription {
            receiver: self.adapter.subscribe(),
            topic: Some(topic),
        }
    }

    /// Receive every message regardless of topic.
    #[must_use]
    pub fn subscribe_all(&self) -> ControlSubscription {
        ControlSubscription {
            receiver: self.adapter.subscribe(),
            topic: None,
        }
    }
}

/// A subscription on a [`ControlBus`].
pub struct ControlSubscription {
    receiver: broadcast::Receiver<ControlEnvelope>,
    topic: Option<String>,
}

impl ControlSubscription {
    fn matches(&self, envelope: &ControlEnvelope) -> bool {
        self.topic.as_deref().map_or(true, |t| t == envelope.topic)
    }

    /// Next matching message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message on the subscribed topic
    /// - `None` - The bus closed (for a channel bus: the remote end is gone)
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        loop {
            let envelope = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Control subscriber lagged, messages dropped");
                    continue;
                }
            };
            if self.matches(&envelope) {
                return Some(envelope.message);
            }
        }
    }

    /// Convert into a [`Stream`] of matching messages.
    #[must_use]
    pub fn into_stream(self) -> ControlStream {
        ControlStream {
            inner: BroadcastStream::new(self.receiver),
            topic: self.topic,
        }
    }
}

/// Stream adapter over a [`ControlSubscription`].
pub struct ControlStream {
    inner: BroadcastStream<ControlEnvelope>,
    topic: Option<String>,
}

impl Stream for ControlStream {
    type Item = ControlMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(envelope))) => {
                    let wanted = self
                        .topic
                        .as_deref()
                        .map_or(true, |t| t == envelope.topic);
                    if wanted {
                        return Poll::Ready(Some(envelope.message));
                    }
                }
                // Lagged: skip what was lost
                Poll::Ready(Some(Err(_))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
