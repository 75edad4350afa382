//! # Bus Adapters
//!
//! Transport behind a [`crate::ControlBus`].

use crate::channel::ChannelEnd;
use crate::message::ControlEnvelope;
use crate::{BusError, DEFAULT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Transport for control envelopes.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Publish an envelope.
    ///
    /// Returns the number of receivers the envelope was handed to. For a
    /// channel adapter that is the remote end (1).
    async fn publish(&self, envelope: ControlEnvelope) -> Result<usize, BusError>;

    /// Receive every envelope arriving on this adapter from now on.
    fn subscribe(&self) -> broadcast::Receiver<ControlEnvelope>;
}

// ============================================================================
// InProcBusAdapter
// ============================================================================

/// Local broadcast bus. Publishers and subscribers share one process.
pub struct InProcBusAdapter {
    sender: broadcast::Sender<ControlEnvelope>,
}

impl InProcBusAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for InProcBusAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusAdapter for InProcBusAdapter {
    async fn publish(&self, envelope: ControlEnvelope) -> Result<usize, BusError> {
        let topic = envelope.topic.clone();
        match self.sender.send(envelope) {
            Ok(count) => {
                debug!(topic = %topic, receivers = count, "Control message published");
                Ok(count)
            }
            Err(_) => {
                // No subscribers; not an error for a local bus
                debug!(topic = %topic, "Control message published with no subscribers");
                Ok(0)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ControlEnvelope> {
        self.sender.subscribe()
    }
}

// ============================================================================
// ChannelBusAdapter
// ============================================================================

/// Bus over one end of a [`crate::channel_pair`].
///
/// Publishing sends to the remote end. Envelopes arriving from the remote end
/// are rebroadcast to local subscribers by a pump task; when the remote end
/// goes away every subscriber observes the bus as closed.
///
/// Must be constructed inside a tokio runtime.
pub struct ChannelBusAdapter {
    outbound: crate::channel::ChannelSender<ControlEnvelope>,
    local: Arc<Mutex<Option<broadcast::Sender<ControlEnvelope>>>>,
    pump: JoinHandle<()>,
}

impl ChannelBusAdapter {
    pub fn new(end: ChannelEnd<ControlEnvelope>) -> Self {
        let (outbound, mut inbound) = end.split();
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let local = Arc::new(Mutex::new(Some(sender.clone())));

        let local_for_pump = Arc::clone(&local);
        let pump = tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                if sender.send(envelope).is_err() {
                    debug!("Control message arrived with no local subscribers");
                }
            }
            debug!("Remote control channel closed");
            drop(sender);
            if let Ok(mut slot) = local_for_pump.lock() {
                slot.take();
            }
        });

        Self {
            outbound,
            local,
            pump,
        }
    }

    /// True once the remote end has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.local.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

#[async_trait]
impl BusAdapter for ChannelBusAdapter {
    async fn publish(&self, envelope: ControlEnvelope) -> Result<usize, BusError> {
        let topic = envelope.topic.clone();
        self.outbound.send(envelope).await.map_err(|e| {
            warn!(topic = %topic, "Control message could not reach remote end");
            e
        })?;
        Ok(1)
    }

    fn subscribe(&self) -> broadcast::Receiver<ControlEnvelope> {
        let live = self
            .local
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(broadcast::Sender::subscribe));
        match live {
            Some(receiver) => receiver,
            None => {
                // Already closed: hand out a receiver that reports Closed.
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        }
    }
}

impl Drop for ChannelBusAdapter {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
