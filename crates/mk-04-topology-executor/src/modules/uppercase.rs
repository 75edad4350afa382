//! Upper-casing transform.

use super::{Module, TaskSlot};
use crate::domain::ModuleError;
use mk_01_pipe_kernel::{Chunk, Kernel, Pipe, PipeOptions};
use tracing::debug;

/// Upper-cases every chunk. Non-text chunks are rendered as text first, so
/// JSON values come out as their upper-cased serialization.
///
/// Ends its output once its input ends.
pub struct UppercaseTransform {
    input: Pipe,
    output: Pipe,
    task: TaskSlot,
}

impl UppercaseTransform {
    pub fn new(kernel: &Kernel) -> Result<Self, ModuleError> {
        Ok(Self {
            input: kernel.create_pipe(PipeOptions::labeled("uppercase.in"))?,
            output: kernel.create_pipe(PipeOptions::labeled("uppercase.out"))?,
            task: TaskSlot::default(),
        })
    }
}

fn uppercase(chunk: &Chunk) -> Chunk {
    Chunk::Text(chunk.to_text().to_uppercase())
}

impl Module for UppercaseTransform {
    fn input_pipe(&self) -> Option<Pipe> {
        Some(self.input.clone())
    }

    fn output_pipe(&self) -> Option<Pipe> {
        Some(self.output.clone())
    }

    fn start(&self) {
        let input = self.input.clone();
        let output = self.output.clone();
        self.task.spawn_once(async move {
            while let Some(chunk) = input.read().await {
                if output.write(uppercase(&chunk)).await.is_err() {
                    debug!(pipe = %output.label(), "uppercase output ended");
                    return;
                }
            }
            output.end();
        });
    }

    fn stop(&self) {
        self.task.abort();
    }
}
