//! In-memory collaborators and the process-backed wrapper spawner.

pub mod graph;
pub mod identity;
pub mod spawner;

pub use graph::InMemoryNodeGraph;
pub use identity::{GuestEntry, InMemoryIdentityRegistry};
pub use spawner::ProcessWrapperSpawner;
