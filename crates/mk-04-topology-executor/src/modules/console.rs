//! Logging sink.

use super::{parse_params, Module, TaskSlot};
use crate::domain::ModuleError;
use mk_01_pipe_kernel::{Kernel, Pipe, PipeOptions};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ConsoleParams {
    #[serde(default = "default_prefix")]
    prefix: String,
}

fn default_prefix() -> String {
    "[sink]".to_string()
}

/// Lines retained by [`ConsoleSink::lines`]. Older lines are dropped.
pub const CONSOLE_HISTORY_LIMIT: usize = 1024;

/// Logs every chunk it receives as `<prefix> <text>`.
///
/// The last [`CONSOLE_HISTORY_LIMIT`] lines are kept for inspection.
pub struct ConsoleSink {
    input: Pipe,
    prefix: String,
    lines: Arc<Mutex<VecDeque<String>>>,
    task: TaskSlot,
}

impl ConsoleSink {
    pub fn new(kernel: &Kernel, prefix: impl Into<String>) -> Result<Self, ModuleError> {
        Ok(Self {
            input: kernel.create_pipe(PipeOptions::labeled("console.in"))?,
            prefix: prefix.into(),
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(64))),
            task: TaskSlot::default(),
        })
    }

    pub fn from_params(kernel: &Kernel, params: &serde_json::Value) -> Result<Self, ModuleError> {
        let params: ConsoleParams = parse_params("ConsoleSink", params)?;
        Self::new(kernel, params.prefix)
    }

    /// Most recent lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

impl Module for ConsoleSink {
    fn input_pipe(&self) -> Option<Pipe> {
        Some(self.input.clone())
    }

    fn start(&self) {
        let input = self.input.clone();
        let prefix = self.prefix.clone();
        let lines = Arc::clone(&self.lines);
        self.task.spawn_once(async move {
            while let Some(chunk) = input.read().await {
                let line = format!("{prefix} {}", chunk.to_text());
                info!(target: "mk::console", "{line}");
                let mut history = lines.lock();
                if history.len() == CONSOLE_HISTORY_LIMIT {
                    history.pop_front();
                }
                history.push_back(line);
            }
        });
    }

    fn stop(&self) {
        self.task.abort();
    }
}
