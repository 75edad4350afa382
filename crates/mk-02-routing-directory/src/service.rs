//! # Routing Directory Service
//!
//! Endpoint table keyed by id, with change events and TTL expiry.
//!
//! ## Locking
//!
//! - The table, listener list and counters sit behind short `parking_lot`
//!   mutexes that are never held while a listener runs.
//! - Every mutating operation runs under a reentrant delivery lock, so events
//!   reach listeners in the order the operations happened, and a listener
//!   may call back into the directory from inside its callback.

use crate::domain::{
    RouterConfig, RouterEvent, RouterEventKind, RoutingAnnouncement, RoutingEndpoint, RoutingError,
    SweepStats,
};
use crate::subscription::{Listener, ListenerId, Subscription};
use mk_telemetry::{ROUTER_ANNOUNCEMENTS, ROUTER_ENDPOINTS, ROUTER_LISTENER_PANICS, ROUTER_SWEPT};
use parking_lot::{Mutex, ReentrantMutex};
use shared_types::{SharedTimeSource, SystemTimeSource, Timestamp};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Routing directory handle. Clones share the same table.
#[derive(Clone)]
pub struct RoutingDirectory {
    inner: Arc<DirectoryInner>,
}

pub(crate) struct DirectoryInner {
    config: RouterConfig,
    clock: SharedTimeSource,
    delivery: ReentrantMutex<()>,
    endpoints: Mutex<BTreeMap<String, RoutingEndpoint>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
    stats: Mutex<SweepStats>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RoutingDirectory {
    /// Directory on the system clock.
    pub fn new(config: RouterConfig) -> Self {
        Self::with_time_source(config, SystemTimeSource::shared())
    }

    pub fn with_time_source(config: RouterConfig, clock: SharedTimeSource) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                config,
                clock,
                delivery: ReentrantMutex::new(()),
                endpoints: Mutex::new(BTreeMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                stats: Mutex::new(SweepStats::default()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Current time on the directory's clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    /// Insert or refresh an endpoint.
    ///
    /// `announced_at` survives re-announces; `updated_at` and `expires_at`
    /// are refreshed every time. Emits `added` or `updated`.
    pub fn announce(
        &self,
        announcement: RoutingAnnouncement,
    ) -> Result<RoutingEndpoint, RoutingError> {
        if announcement.id.is_empty() {
            return Err(RoutingError::InvalidArgument(
                "announce requires a non-empty id".into(),
            ));
        }

        let _order = self.inner.delivery.lock();
        let now = self.inner.clock.now();
        let expires_at = now.saturating_add_millis(self.inner.config.ttl_ms);

        let (endpoint, kind) = {
            let mut table = self.inner.endpoints.lock();
            let announced_at = table
                .get(&announcement.id)
                .map(|existing| existing.announced_at);
            let kind = if announced_at.is_some() {
                RouterEventKind::Updated
            } else {
                RouterEventKind::Added
            };
            let endpoint = RoutingEndpoint {
                id: announcement.id,
                kind: announcement.kind,
                coordinates: announcement.coordinates,
                metadata: announcement.metadata,
                announced_at: announced_at.unwrap_or(now),
                updated_at: now,
                expires_at,
            };
            table.insert(endpoint.id.clone(), endpoint.clone());
            (endpoint, kind)
        };

        debug!(
            id = %endpoint.id,
            kind = %endpoint.kind,
            coordinates = %endpoint.coordinates,
            event = kind.as_str(),
            "router announce"
        );
        ROUTER_ANNOUNCEMENTS
            .with_label_values(&[kind.as_str()])
            .inc();
        if kind == RouterEventKind::Added {
            ROUTER_ENDPOINTS.inc();
        }

        self.inner.emit(kind, endpoint.clone(), now);
        Ok(endpoint)
    }

    /// Remove an endpoint. No-op (and no event) when absent or `id` is empty.
    ///
    /// Returns whether an endpoint was removed.
    pub fn withdraw(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let _order = self.inner.delivery.lock();
        let removed = self.inner.endpoints.lock().remove(id);
        let Some(endpoint) = removed else {
            return false;
        };

        debug!(id = %id, "router withdraw");
        ROUTER_ENDPOINTS.dec();
        let now = self.inner.clock.now();
        self.inner.emit(RouterEventKind::Removed, endpoint, now);
        true
    }

    /// Independent snapshot of every live endpoint, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<RoutingEndpoint> {
        self.inner.endpoints.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<RoutingEndpoint> {
        self.inner.endpoints.lock().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.endpoints.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best endpoint for `coordinates`.
    ///
    /// The most recently updated endpoint with exactly these coordinates wins;
    /// on an `updated_at` tie the lexicographically smallest id wins. Expiry
    /// is not checked here; stale endpoints remain resolvable until swept.
    #[must_use]
    pub fn resolve(&self, coordinates: &str) -> Option<RoutingEndpoint> {
        self.inner
            .endpoints
            .lock()
            .values()
            .filter(|e| e.coordinates == coordinates)
            // Ascending id iteration + strict `>` keeps the smallest id on ties.
            .fold(None::<&RoutingEndpoint>, |best, e| match best {
                Some(b) if e.updated_at <= b.updated_at => Some(b),
                _ => Some(e),
            })
            .cloned()
    }

    /// Remove every endpoint whose age (`now - updated_at`) exceeds the TTL.
    ///
    /// Emits one `removed` event per deletion and returns the removed ids.
    pub fn sweep(&self) -> Vec<String> {
        let _order = self.inner.delivery.lock();
        let now = self.inner.clock.now();
        let ttl_ms = self.inner.config.ttl_ms;

        let (stale, remaining) = {
            let mut table = self.inner.endpoints.lock();
            let stale_ids: Vec<String> = table
                .values()
                .filter(|e| now.millis_since(e.updated_at) > ttl_ms)
                .map(|e| {
                    warn!(
                        id = %e.id,
                        age_ms = now.millis_since(e.updated_at),
                        ttl_ms,
                        last_updated = %e.updated_at,
                        "sweep.stale"
                    );
                    e.id.clone()
                })
                .collect();
            let stale: Vec<RoutingEndpoint> = stale_ids
                .iter()
                .filter_map(|id| table.remove(id))
                .collect();
            (stale, table.len())
        };

        {
            let mut stats = self.inner.stats.lock();
            stats.total_sweeps += 1;
            stats.total_removed += stale.len() as u64;
            stats.last_sweep_time = Some(now);
        }

        if !stale.is_empty() {
            info!(removed = stale.len(), remaining, "sweep.complete");
            ROUTER_SWEPT.inc_by(stale.len() as u64);
            ROUTER_ENDPOINTS.sub(stale.len() as f64);
        }

        let mut removed = Vec::with_capacity(stale.len());
        for endpoint in stale {
            debug!(id = %endpoint.id, "sweep.removed");
            removed.push(endpoint.id.clone());
            self.inner.emit(RouterEventKind::Removed, endpoint, now);
        }
        removed
    }

    #[must_use]
    pub fn sweep_stats(&self) -> SweepStats {
        *self.inner.stats.lock()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval_ms`. Idempotent.
    ///
    /// Must be called inside a tokio runtime. The task holds only a weak
    /// reference and exits once the last directory handle is dropped.
    pub fn start_sweeper(&self) {
        let mut slot = self.inner.sweeper.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let weak: Weak<DirectoryInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the first sweep is one period out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                RoutingDirectory { inner }.sweep();
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "Sweeper started");
    }

    /// Stop the sweeper. Idempotent. A sweep already running completes.
    pub fn stop_sweeper(&self) {
        if let Some(task) = self.inner.sweeper.lock().take() {
            task.abort();
            info!("Sweeper stopped");
        }
    }

    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Register a listener for every subsequent event.
    ///
    /// Listeners run synchronously, in registration order, on the thread
    /// performing the change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RouterEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        debug!(listener = id, "Router listener subscribed");
        Subscription::new(id, &self.inner)
    }

    /// Remove a listener by id. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.remove_listener(id)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl DirectoryInner {
    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = before != listeners.len();
        if removed {
            debug!(listener = id, "Router listener unsubscribed");
        }
        removed
    }

    fn emit(&self, kind: RouterEventKind, endpoint: RoutingEndpoint, timestamp: Timestamp) {
        let listeners: Vec<(ListenerId, Listener)> = self.listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }
        let event = RouterEvent {
            kind,
            endpoint,
            timestamp,
        };
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                ROUTER_LISTENER_PANICS.inc();
                error!(
                    listener = id,
                    event = kind.as_str(),
                    endpoint = %event.endpoint.id,
                    "Router listener panicked"
                );
            }
        }
    }
}

impl Drop for DirectoryInner {
    fn drop(&mut self) {
        // The gauge is shared by every directory in the process.
        ROUTER_ENDPOINTS.sub(self.endpoints.get_mut().len() as f64);
        if let Some(task) = self.sweeper.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests;
