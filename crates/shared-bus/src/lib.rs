//! # Shared Bus - Control Plane
//!
//! Topic-based publish/subscribe used for control traffic between the
//! topology executor and the nodes it runs. Data never travels here; it
//! flows through pipes.
//!
//! ```text
//! ┌──────────────┐   publish("control.hello")   ┌──────────────┐
//! │   Executor   │ <─────────────────────────── │    Worker    │
//! │  ControlBus  │ ───────────────────────────> │  ControlBus  │
//! └──────────────┘   publish("control.cmd")     └──────────────┘
//!        │                                             │
//!  ChannelBusAdapter ═════════ channel_pair ═════ ChannelBusAdapter
//! ```
//!
//! The same [`ControlBus`] API sits on top of either adapter:
//!
//! - [`InProcBusAdapter`]: a local broadcast channel.
//! - [`ChannelBusAdapter`]: one end of a paired channel, so both sides of an
//!   isolation boundary see a bus.

#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapter;
pub mod bus;
pub mod channel;
pub mod message;

pub use adapter::{BusAdapter, ChannelBusAdapter, InProcBusAdapter};
pub use bus::{ControlBus, ControlStream, ControlSubscription};
pub use channel::{channel_pair, ChannelEnd, ChannelReceiver, ChannelSender};
pub use message::{ControlEnvelope, ControlMessage, CONTROL_COMMAND_TOPIC, CONTROL_HELLO_TOPIC};

use thiserror::Error;

/// Maximum control messages buffered per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors from bus and channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The other side of the channel, or the bus itself, is gone.
    #[error("control channel closed")]
    Closed,
}
