//! Peer sources and transports.

pub mod config_source;
pub mod logging_transport;
pub mod mesh;

pub use config_source::ConfigPeerSource;
pub use logging_transport::LoggingPeerTransport;
pub use mesh::InMemoryMesh;
