//! Static peer list from configuration.

use crate::domain::DiscoveryError;
use crate::ports::PeerSource;
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct ConfigPeerSource {
    peers: Vec<String>,
}

impl ConfigPeerSource {
    pub fn new<I, S>(peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            peers: peers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PeerSource for ConfigPeerSource {
    async fn get_peers(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.peers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_configured_peers() {
        let source = ConfigPeerSource::new(["tcp://a:1", "tcp://b:2"]);
        assert_eq!(source.get_peers().await.unwrap().len(), 2);
    }
}
