//! Domain layer: capability declarations and error types.

pub mod capability;
pub mod errors;

pub use capability::{Capabilities, CapabilityQuery};
pub use errors::{KernelError, PipeError};
