//! # Duplex Pipe
//!
//! A flow-controlled chunk channel with a bounded buffer.
//!
//! - `write` suspends while `high_water_mark` chunks are buffered.
//! - `end` closes the writable side; readers drain what is buffered and then
//!   observe end-of-stream.
//! - The readable side is consumed by at most one attached edge at a time.
//!   Detaching the edge releases the claim, so the pipe can be re-wired.
//!
//! A `Pipe` is a handle: clones refer to the same channel.

use crate::domain::PipeError;
use parking_lot::Mutex;
use shared_types::Chunk;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default number of chunks buffered before writers suspend.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Options for [`Pipe::new`] and [`crate::Kernel::create_pipe`].
#[derive(Debug, Clone, Default)]
pub struct PipeOptions {
    /// Buffered chunks before `write` suspends. Defaults to
    /// [`DEFAULT_HIGH_WATER_MARK`].
    pub high_water_mark: Option<usize>,
    /// Name used in logs. A random one is generated when absent.
    pub label: Option<String>,
}

impl PipeOptions {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_high_water_mark(mut self, hwm: usize) -> Self {
        self.high_water_mark = Some(hwm);
        self
    }
}

/// Handle to a duplex pipe.
#[derive(Clone)]
pub struct Pipe {
    inner: Arc<PipeInner>,
}

struct PipeInner {
    label: String,
    high_water_mark: usize,
    writer: Mutex<Option<mpsc::Sender<Chunk>>>,
    reader: tokio::sync::Mutex<mpsc::Receiver<Chunk>>,
    reader_attached: AtomicBool,
}

impl Pipe {
    pub fn new(options: PipeOptions) -> Self {
        let high_water_mark = options
            .high_water_mark
            .unwrap_or(DEFAULT_HIGH_WATER_MARK)
            .max(1);
        let label = options
            .label
            .unwrap_or_else(|| format!("pipe-{}", uuid::Uuid::new_v4().simple()));
        let (tx, rx) = mpsc::channel(high_water_mark);
        Self {
            inner: Arc::new(PipeInner {
                label,
                high_water_mark,
                writer: Mutex::new(Some(tx)),
                reader: tokio::sync::Mutex::new(rx),
                reader_attached: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.inner.high_water_mark
    }

    /// Write a chunk, suspending while the buffer is full.
    pub async fn write(&self, chunk: impl Into<Chunk>) -> Result<(), PipeError> {
        let sender = self
            .inner
            .writer
            .lock()
            .clone()
            .ok_or_else(|| PipeError::Ended(self.inner.label.clone()))?;
        sender
            .send(chunk.into())
            .await
            .map_err(|_| PipeError::Ended(self.inner.label.clone()))
    }

    /// Read the next chunk. `None` once the pipe has ended and is drained.
    ///
    /// Competes with an attached edge if one is running.
    pub async fn read(&self) -> Option<Chunk> {
        self.inner.reader.lock().await.recv().await
    }

    /// Read until end-of-stream.
    pub async fn collect(&self) -> Vec<Chunk> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read().await {
            out.push(chunk);
        }
        out
    }

    /// Close the writable side. Writes already suspended still complete.
    pub fn end(&self) {
        if self.inner.writer.lock().take().is_some() {
            tracing::trace!(pipe = %self.inner.label, "Pipe ended");
        }
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.writer.lock().is_none()
    }

    /// True when both handles refer to the same pipe.
    #[must_use]
    pub fn ptr_eq(&self, other: &Pipe) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn has_reader(&self) -> bool {
        self.inner.reader_attached.load(Ordering::Acquire)
    }

    /// Claim the readable side for an edge.
    pub(crate) fn attach_reader(&self) -> Result<ReaderClaim, PipeError> {
        self.inner
            .reader_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipeError::ReaderAttached(self.inner.label.clone()))?;
        Ok(ReaderClaim { pipe: self.clone() })
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("label", &self.inner.label)
            .field("high_water_mark", &self.inner.high_water_mark)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Exclusive claim on a pipe's readable side. Released on drop.
pub(crate) struct ReaderClaim {
    pipe: Pipe,
}

impl ReaderClaim {
    pub(crate) fn pipe(&self) -> &Pipe {
        &self.pipe
    }
}

impl Drop for ReaderClaim {
    fn drop(&mut self) {
        self.pipe
            .inner
            .reader_attached
            .store(false, Ordering::Release);
    }
}
