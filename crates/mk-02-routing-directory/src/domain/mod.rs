//! Domain layer: endpoints, events, configuration and errors.

pub mod config;
pub mod endpoint;
pub mod errors;

pub use config::RouterConfig;
pub use endpoint::{RouterEvent, RouterEventKind, RoutingAnnouncement, RoutingEndpoint, SweepStats};
pub use errors::RoutingError;
