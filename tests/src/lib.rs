//! # mkolbol Test Suite
//!
//! Cross-crate flows that no single crate can exercise on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── pipeline_benchmarks.rs   # Pipe throughput, split/merge, directory ops
//! └── src/integration/
//!     ├── pipelines.rs             # Topology files through the executor
//!     ├── control_plane.rs         # Worker harness over paired channels
//!     └── routing.rs               # Directory expiry and federation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mk-tests
//! cargo test -p mk-tests integration::routing::
//! cargo bench -p mk-tests
//! ```

pub mod integration;
