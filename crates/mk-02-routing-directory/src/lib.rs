//! # Routing Directory
//!
//! Tracks where every live service endpoint currently lives.
//!
//! Endpoints are announced with an id, a type and coordinates, stay live for
//! a TTL after their last announce, and are removed by `withdraw` or by the
//! sweeper. Every change is pushed synchronously to subscribed listeners.
//!
//! ```text
//!            announce            announce (refresh)
//!  absent ────────────> live ─────────────────────> live
//!     ^                   │
//!     └── withdraw/sweep ─┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use mk_02_routing_directory::{RouterConfig, RoutingAnnouncement, RoutingDirectory};
//!
//! let dir = RoutingDirectory::new(RouterConfig::default().with_ttl_ms(1_000));
//! let _sub = dir.subscribe(|event| println!("{:?} {}", event.kind, event.endpoint.id));
//!
//! dir.announce(RoutingAnnouncement::new("svc-a", "inproc", "node:svc-a")).unwrap();
//! assert_eq!(dir.resolve("node:svc-a").map(|e| e.id), Some("svc-a".to_string()));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod service;
pub mod subscription;

pub use domain::endpoint::FEDERATION_SOURCE_KEY;
pub use domain::{
    RouterConfig, RouterEvent, RouterEventKind, RoutingAnnouncement, RoutingEndpoint, RoutingError,
    SweepStats,
};
pub use service::RoutingDirectory;
pub use subscription::{Listener, ListenerId, Subscription};

#[cfg(feature = "test-utils")]
pub use shared_types::test_utils::ManualTimeSource;
