//! Listener subscriptions.

use crate::domain::RouterEvent;
use crate::service::DirectoryInner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Identifier of a registered listener.
pub type ListenerId = u64;

/// Callback invoked synchronously for every router event.
pub type Listener = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// Handle returned by [`crate::RoutingDirectory::subscribe`].
///
/// `unsubscribe` is idempotent. Dropping the handle also unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: ListenerId,
    directory: Weak<DirectoryInner>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, directory: &Arc<DirectoryInner>) -> Self {
        Self {
            id,
            directory: Arc::downgrade(directory),
            active: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop receiving events. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(directory) = self.directory.upgrade() {
                directory.remove_listener(self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
