//! Spawns external servers as child processes.

use crate::domain::{ExecutorError, ExternalServerManifest};
use crate::ports::ExternalWrapperSpawner;
use crate::process::{ExternalWrapper, ProcessNode, ProcessSpec, StderrMode};
use async_trait::async_trait;
use mk_01_pipe_kernel::Kernel;

/// Runs each manifest's command with stderr forwarded to the wrapper's error
/// pipe.
pub struct ProcessWrapperSpawner {
    kernel: Kernel,
}

impl ProcessWrapperSpawner {
    pub fn new(kernel: Kernel) -> Self {
        Self { kernel }
    }
}

#[async_trait]
impl ExternalWrapperSpawner for ProcessWrapperSpawner {
    async fn spawn(
        &self,
        manifest: &ExternalServerManifest,
    ) -> Result<ExternalWrapper, ExecutorError> {
        let id = manifest
            .uuid
            .clone()
            .unwrap_or_else(|| manifest.servername.clone());
        let process = ProcessNode::spawn(
            &manifest.servername,
            &ProcessSpec::from(manifest),
            &self.kernel,
            StderrMode::Pipe,
        )?;
        Ok(ExternalWrapper::new(id, manifest.clone(), process))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mk_01_pipe_kernel::Chunk;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawns_and_bridges_stdio() {
        let spawner = ProcessWrapperSpawner::new(Kernel::new());
        let mut manifest = ExternalServerManifest::new("echo-server", "cat");
        manifest.uuid = Some("u-1".into());

        let wrapper = spawner.spawn(&manifest).await.unwrap();
        assert_eq!(wrapper.id(), "u-1");
        assert_eq!(wrapper.manifest().servername, "echo-server");

        wrapper.input_pipe().write("ping").await.unwrap();
        wrapper.input_pipe().end();
        let out: Vec<u8> = wrapper
            .output_pipe()
            .collect()
            .await
            .into_iter()
            .flat_map(Chunk::into_bytes)
            .collect();
        assert_eq!(out, b"ping");
        assert!(wrapper.shutdown(Duration::from_secs(5)).await.is_some());
    }
}
