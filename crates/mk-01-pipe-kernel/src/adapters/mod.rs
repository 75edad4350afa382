//! Pipe adapters.

pub mod inproc;

pub use inproc::InProcPipeAdapter;
