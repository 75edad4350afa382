//! Periodic JSON source.

use super::{parse_params, Module, TaskSlot};
use crate::domain::ModuleError;
use mk_01_pipe_kernel::{Chunk, Kernel, Pipe, PipeOptions};
use serde::Deserialize;
use serde_json::json;
use shared_types::{SystemTimeSource, TimeSource};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

const DEFAULT_PERIOD_MS: u64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerParams {
    #[serde(default = "default_period")]
    period_ms: u64,
}

fn default_period() -> u64 {
    DEFAULT_PERIOD_MS
}

/// Emits `{"t": <epoch ms>, "n": <count>}` every `periodMs`, starting one
/// period after `start`.
pub struct TimerSource {
    output: Pipe,
    period: Duration,
    task: TaskSlot,
}

impl TimerSource {
    pub fn new(kernel: &Kernel, period: Duration) -> Result<Self, ModuleError> {
        Ok(Self {
            output: kernel.create_pipe(PipeOptions::labeled("timer.out"))?,
            period: period.max(Duration::from_millis(1)),
            task: TaskSlot::default(),
        })
    }

    pub fn from_params(kernel: &Kernel, params: &serde_json::Value) -> Result<Self, ModuleError> {
        let params: TimerParams = parse_params("TimerSource", params)?;
        Self::new(kernel, Duration::from_millis(params.period_ms))
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Module for TimerSource {
    fn output_pipe(&self) -> Option<Pipe> {
        Some(self.output.clone())
    }

    fn start(&self) {
        let output = self.output.clone();
        let period = self.period;
        self.task.spawn_once(async move {
            let clock = SystemTimeSource;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut count: u64 = 0;
            loop {
                ticker.tick().await;
                count += 1;
                let chunk = Chunk::Json(json!({ "t": clock.now().as_millis(), "n": count }));
                if output.write(chunk).await.is_err() {
                    debug!(pipe = %output.label(), "timer output ended");
                    return;
                }
            }
        });
    }

    fn stop(&self) {
        self.task.abort();
    }
}
