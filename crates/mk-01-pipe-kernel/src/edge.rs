//! # Edges
//!
//! An edge is a spawned task moving chunks from one pipe's readable side into
//! another pipe. Backpressure comes from the destination's bounded buffer:
//! the edge awaits each write before reading the next chunk.

use crate::pipe::{Pipe, ReaderClaim};
use crate::domain::PipeError;
use mk_telemetry::KERNEL_EDGES_ACTIVE;
use tokio::task::JoinHandle;
use tracing::debug;

/// Options for [`crate::Kernel::connect_with`].
#[derive(Debug, Clone, Copy)]
pub struct EdgeOptions {
    /// End the destination when the source ends.
    pub end_on_finish: bool,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            end_on_finish: true,
        }
    }
}

/// Handle to one or more running edge tasks.
///
/// Dropping the handle leaves the edge running.
#[must_use = "dropping an EdgeHandle leaves the edge running; call detach() to stop it"]
pub struct EdgeHandle {
    label: String,
    tasks: Vec<JoinHandle<()>>,
}

impl EdgeHandle {
    pub(crate) fn new(label: String, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { label, tasks }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait until every task of this edge has drained its source.
    pub async fn finished(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Stop forwarding and release the source's reader claim.
    ///
    /// The destination is not ended. A chunk that was mid-write when the edge
    /// was stopped is dropped.
    pub async fn detach(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
        debug!(edge = %self.label, "Edge detached");
    }
}

/// Tracks the running-edges gauge for the lifetime of one task.
pub(crate) struct ActiveEdge;

impl ActiveEdge {
    pub(crate) fn new() -> Self {
        KERNEL_EDGES_ACTIVE.inc();
        Self
    }
}

impl Drop for ActiveEdge {
    fn drop(&mut self) {
        KERNEL_EDGES_ACTIVE.dec();
    }
}

/// Spawn a single forwarding task. Requires a tokio runtime.
pub(crate) fn spawn_forward(claim: ReaderClaim, to: Pipe, options: EdgeOptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _active = ActiveEdge::new();
        let from = claim.pipe().clone();
        while let Some(chunk) = from.read().await {
            if let Err(e) = to.write(chunk).await {
                debug!(from = %from.label(), to = %to.label(), error = %e, "Edge stopped");
                return;
            }
        }
        if options.end_on_finish {
            to.end();
        }
        drop(claim);
    })
}

impl Pipe {
    /// Forward this pipe into `to` and return `to`, so calls chain:
    /// `a.pipe_to(&b)?.pipe_to(&c)?`.
    ///
    /// The edge runs detached. Use [`crate::Kernel::connect`] to keep a handle.
    pub fn pipe_to(&self, to: &Pipe) -> Result<Pipe, PipeError> {
        let claim = self.attach_reader()?;
        let _detached = spawn_forward(claim, to.clone(), EdgeOptions::default());
        Ok(to.clone())
    }
}
