//! # Ports
//!
//! The transport behind [`crate::Kernel::create_pipe`].

use crate::domain::PipeError;
use crate::pipe::{Pipe, PipeOptions};

/// Creates duplex pipes for a kernel.
pub trait PipeAdapter: Send + Sync {
    /// Create a new duplex pipe.
    fn create_duplex(&self, options: PipeOptions) -> Result<Pipe, PipeError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
