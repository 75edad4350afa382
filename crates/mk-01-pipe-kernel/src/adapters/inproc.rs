//! In-process pipe adapter: pipes are tokio channels inside this process.

use crate::domain::PipeError;
use crate::pipe::{Pipe, PipeOptions};
use crate::ports::PipeAdapter;

/// Default adapter. Applies a kernel-wide high-water mark unless the caller
/// asks for a specific one.
#[derive(Debug, Clone, Default)]
pub struct InProcPipeAdapter {
    default_high_water_mark: Option<usize>,
}

impl InProcPipeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `hwm` for pipes created without an explicit high-water mark.
    #[must_use]
    pub fn with_default_high_water_mark(hwm: usize) -> Self {
        Self {
            default_high_water_mark: Some(hwm),
        }
    }
}

impl PipeAdapter for InProcPipeAdapter {
    fn create_duplex(&self, mut options: PipeOptions) -> Result<Pipe, PipeError> {
        if options.high_water_mark.is_none() {
            options.high_water_mark = self.default_high_water_mark;
        }
        Ok(Pipe::new(options))
    }

    fn name(&self) -> &'static str {
        "inproc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::DEFAULT_HIGH_WATER_MARK;

    #[test]
    fn test_default_high_water_mark() {
        let pipe = InProcPipeAdapter::new()
            .create_duplex(PipeOptions::default())
            .unwrap();
        assert_eq!(pipe.high_water_mark(), DEFAULT_HIGH_WATER_MARK);
    }

    #[test]
    fn test_adapter_override_yields_to_explicit_option() {
        let adapter = InProcPipeAdapter::with_default_high_water_mark(4);
        let implicit = adapter.create_duplex(PipeOptions::default()).unwrap();
        let explicit = adapter
            .create_duplex(PipeOptions::default().with_high_water_mark(9))
            .unwrap();
        assert_eq!(implicit.high_water_mark(), 4);
        assert_eq!(explicit.high_water_mark(), 9);
    }
}
