//! # Kernel
//!
//! Creates pipes, composes them, and keeps the capability registry.
//!
//! Composition spawns tasks, so `connect`, `split` and `merge` must be called
//! inside a tokio runtime.

use crate::adapters::InProcPipeAdapter;
use crate::domain::{Capabilities, CapabilityQuery, KernelError};
use crate::edge::{spawn_forward, ActiveEdge, EdgeHandle, EdgeOptions};
use crate::pipe::{Pipe, PipeOptions};
use crate::ports::PipeAdapter;
use parking_lot::RwLock;
use shared_types::Chunk;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// One entry of the capability registry.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub capabilities: Capabilities,
    pub pipe: Pipe,
}

/// Pipe kernel handle. Clones share the adapter and registry.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    adapter: Arc<dyn PipeAdapter>,
    // Insertion-ordered; re-registering a name replaces in place.
    registry: RwLock<Vec<Registration>>,
}

impl Kernel {
    /// Kernel over the in-process adapter.
    pub fn new() -> Self {
        Self::with_adapter(Arc::new(InProcPipeAdapter::new()))
    }

    pub fn with_adapter(adapter: Arc<dyn PipeAdapter>) -> Self {
        debug!(adapter = adapter.name(), "Kernel created");
        Self {
            inner: Arc::new(KernelInner {
                adapter,
                registry: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn create_pipe(&self, options: PipeOptions) -> Result<Pipe, KernelError> {
        Ok(self.inner.adapter.create_duplex(options)?)
    }

    /// Forward `from` into `to`, ending `to` when `from` ends.
    pub fn connect(&self, from: &Pipe, to: &Pipe) -> Result<EdgeHandle, KernelError> {
        self.connect_with(from, to, EdgeOptions::default())
    }

    pub fn connect_with(
        &self,
        from: &Pipe,
        to: &Pipe,
        options: EdgeOptions,
    ) -> Result<EdgeHandle, KernelError> {
        let claim = from.attach_reader()?;
        let task = spawn_forward(claim, to.clone(), options);
        debug!(from = %from.label(), to = %to.label(), "Pipes connected");
        Ok(EdgeHandle::new(
            format!("{}->{}", from.label(), to.label()),
            vec![task],
        ))
    }

    /// Deliver every chunk of `source` to every destination, in source order.
    ///
    /// Each destination is fed from its own unbounded relay, so a slow
    /// destination never holds back a fast one; its relay grows instead.
    /// Every destination is ended when the source ends.
    pub fn split(&self, source: &Pipe, destinations: &[Pipe]) -> Result<EdgeHandle, KernelError> {
        if destinations.is_empty() {
            return Err(KernelError::InvalidArgument(
                "split requires at least one destination".into(),
            ));
        }
        let claim = source.attach_reader()?;

        let mut tasks = Vec::with_capacity(destinations.len() + 1);
        let mut relays = Vec::with_capacity(destinations.len());
        for dest in destinations {
            let (tx, mut rx) = mpsc::unbounded_channel::<Chunk>();
            let dest = dest.clone();
            tasks.push(tokio::spawn(async move {
                let _active = ActiveEdge::new();
                while let Some(chunk) = rx.recv().await {
                    if dest.write(chunk).await.is_err() {
                        debug!(to = %dest.label(), "Split destination closed");
                        return;
                    }
                }
                dest.end();
            }));
            relays.push(tx);
        }

        let label = format!("{}->split[{}]", source.label(), destinations.len());
        tasks.push(tokio::spawn(async move {
            let _active = ActiveEdge::new();
            let source = claim.pipe().clone();
            while let Some(chunk) = source.read().await {
                // A closed relay means its destination is gone; others continue.
                relays.retain(|relay| relay.send(chunk.clone()).is_ok());
                if relays.is_empty() {
                    break;
                }
            }
            drop(claim);
        }));

        Ok(EdgeHandle::new(label, tasks))
    }

    /// Funnel every source into `destination`.
    ///
    /// Chunks from one source stay in order; sources interleave by arrival.
    /// The destination ends after the last source ends.
    pub fn merge(&self, sources: &[Pipe], destination: &Pipe) -> Result<EdgeHandle, KernelError> {
        if sources.is_empty() {
            return Err(KernelError::InvalidArgument(
                "merge requires at least one source".into(),
            ));
        }
        // Claim every source up front so a failure leaves nothing attached.
        let claims = sources
            .iter()
            .map(Pipe::attach_reader)
            .collect::<Result<Vec<_>, _>>()?;

        let remaining = Arc::new(AtomicUsize::new(claims.len()));
        let tasks = claims
            .into_iter()
            .map(|claim| {
                let dest = destination.clone();
                let remaining = Arc::clone(&remaining);
                tokio::spawn(async move {
                    let _active = ActiveEdge::new();
                    let source = claim.pipe().clone();
                    while let Some(chunk) = source.read().await {
                        if dest.write(chunk).await.is_err() {
                            return;
                        }
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        dest.end();
                    }
                })
            })
            .collect();

        Ok(EdgeHandle::new(
            format!("merge[{}]->{}", sources.len(), destination.label()),
            tasks,
        ))
    }

    /// Register `pipe` under `name`, replacing any earlier registration of the
    /// same name in place.
    pub fn register(&self, name: impl Into<String>, capabilities: Capabilities, pipe: Pipe) {
        let name = name.into();
        let mut registry = self.inner.registry.write();
        match registry.iter_mut().find(|r| r.name == name) {
            Some(existing) => {
                existing.capabilities = capabilities;
                existing.pipe = pipe;
                debug!(name = %name, "Capability registration replaced");
            }
            None => {
                info!(name = %name, kind = %capabilities.kind, "Capability registered");
                registry.push(Registration {
                    name,
                    capabilities,
                    pipe,
                });
            }
        }
    }

    /// Every registered pipe satisfying `query`, in registration order.
    #[must_use]
    pub fn lookup(&self, query: &CapabilityQuery) -> Vec<Pipe> {
        self.inner
            .registry
            .read()
            .iter()
            .filter(|r| query.matches(&r.capabilities))
            .map(|r| r.pipe.clone())
            .collect()
    }

    /// Snapshot of the registry.
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.inner.registry.read().clone()
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut registry = self.inner.registry.write();
        let before = registry.len();
        registry.retain(|r| r.name != name);
        before != registry.len()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
