//! # Pipe Kernel
//!
//! Creation and composition of duplex pipes, plus a capability registry for
//! finding pipes by what they do.
//!
//! ## Architecture
//!
//! - **Domain Layer:** capability declarations and queries, error types
//! - **Ports Layer:** [`PipeAdapter`], the transport behind `create_pipe`
//! - **Service Layer:** [`Kernel`] (connect, split, merge, register, lookup)
//! - **Adapters Layer:** [`InProcPipeAdapter`]
//!
//! ## Example
//!
//! ```rust
//! use mk_01_pipe_kernel::{Kernel, PipeOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let kernel = Kernel::new();
//! let src = kernel.create_pipe(PipeOptions::labeled("src"))?;
//! let d1 = kernel.create_pipe(PipeOptions::labeled("d1"))?;
//! let d2 = kernel.create_pipe(PipeOptions::labeled("d2"))?;
//!
//! let _edge = kernel.split(&src, &[d1.clone(), d2.clone()])?;
//! src.write("1").await?;
//! src.end();
//!
//! assert_eq!(d1.collect().await.len(), 1);
//! assert_eq!(d2.collect().await.len(), 1);
//! # Ok(())
//! # }
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod edge;
pub mod kernel;
pub mod pipe;
pub mod ports;

pub use adapters::InProcPipeAdapter;
pub use domain::{Capabilities, CapabilityQuery, KernelError, PipeError};
pub use edge::{EdgeHandle, EdgeOptions};
pub use kernel::{Kernel, Registration};
pub use pipe::{Pipe, PipeOptions, DEFAULT_HIGH_WATER_MARK};
pub use ports::PipeAdapter;
pub use shared_types::Chunk;
