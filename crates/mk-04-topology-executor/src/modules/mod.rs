//! # Modules
//!
//! A module is the unit of work a node runs. It is built by a typed factory
//! from the kernel and the node's params object, and exposes up to two pipes
//! by convention: `input` and `output`.
//!
//! ## Built-ins
//!
//! | Name | Pipes | Params |
//! |------|-------|--------|
//! | `TimerSource` | output | `periodMs` (default 500) |
//! | `UppercaseTransform` | input, output | none |
//! | `ConsoleSink` | input | `prefix` (default `[sink]`) |

mod console;
mod timer;
mod uppercase;

pub use console::{ConsoleSink, CONSOLE_HISTORY_LIMIT};
pub use timer::TimerSource;
pub use uppercase::UppercaseTransform;

use crate::domain::ModuleError;
use crate::ports::ModuleLookup;
use mk_01_pipe_kernel::{Kernel, Pipe};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running unit of work.
///
/// `start` and `stop` are called from inside a tokio runtime and must not
/// block. Both default to no-ops.
///
/// When `start` runs depends on the run mode. In-process modules are started
/// after every declared connection is applied. A worker module is started by
/// its harness before `worker.ready` is sent, so it is already running while
/// the executor wires its graph pipes. Until then its output queues in the
/// worker channel and the graph pipe, bounded by their high-water marks.
pub trait Module: Send + Sync {
    fn input_pipe(&self) -> Option<Pipe> {
        None
    }

    fn output_pipe(&self) -> Option<Pipe> {
        None
    }

    fn start(&self) {}

    fn stop(&self) {}
}

/// Builds a module from the kernel and the node's params object.
pub type ModuleFactory =
    Arc<dyn Fn(&Kernel, &serde_json::Value) -> Result<Box<dyn Module>, ModuleError> + Send + Sync>;

/// Decode a params object into a typed struct.
///
/// `null` is treated as an empty object.
pub fn parse_params<T: DeserializeOwned>(
    module: &str,
    params: &serde_json::Value,
) -> Result<T, ModuleError> {
    let value = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| ModuleError::InvalidParams {
        module: module.to_string(),
        reason: e.to_string(),
    })
}

/// At most one background task per module.
#[derive(Default)]
pub(crate) struct TaskSlot {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    /// Spawn `future` unless a task is already running. Returns whether it
    /// spawned.
    pub(crate) fn spawn_once<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        *task = Some(tokio::spawn(future));
        true
    }

    pub(crate) fn abort(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Name-keyed factory table, pre-populated with the built-in modules.
pub struct ModuleRegistry {
    factories: RwLock<BTreeMap<String, ModuleFactory>>,
}

impl ModuleRegistry {
    /// Registry holding the built-ins.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("TimerSource", |kernel, params| {
            Ok(Box::new(TimerSource::from_params(kernel, params)?))
        });
        registry.register("UppercaseTransform", |kernel, _params| {
            Ok(Box::new(UppercaseTransform::new(kernel)?))
        });
        registry.register("ConsoleSink", |kernel, params| {
            Ok(Box::new(ConsoleSink::from_params(kernel, params)?))
        });
        registry
    }

    /// Registry with no factories.
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add or replace the factory for `name`.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Kernel, &serde_json::Value) -> Result<Box<dyn Module>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.write().insert(name.into(), Arc::new(factory));
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLookup for ModuleRegistry {
    fn get(&self, name: &str) -> Option<ModuleFactory> {
        self.factories.read().get(name).cloned()
    }
}
