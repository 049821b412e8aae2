//! Registry of upstreams fronted by the request validation proxy

use crate::domain::ProxiedService;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Receives the upstream services a fleet routes through the validation proxy
#[async_trait]
pub trait ValidationUpdater: Send + Sync + std::fmt::Debug {
    /// Replace the fleet's service set. `services` is de-duplicated and sorted.
    async fn update_services(&self, fleet: &str, services: Vec<ProxiedService>) -> Result<()>;
}

/// Keeps the latest service set per fleet in memory
#[derive(Debug, Default)]
pub struct InMemoryValidationUpdater {
    services: RwLock<HashMap<String, Vec<ProxiedService>>>,
}

impl InMemoryValidationUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn services(&self, fleet: &str) -> Vec<ProxiedService> {
        self.services.read().await.get(fleet).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ValidationUpdater for InMemoryValidationUpdater {
    async fn update_services(&self, fleet: &str, services: Vec<ProxiedService>) -> Result<()> {
        info!(
            fleet = %fleet,
            services = ?services.iter().map(|s| s.cluster_name.as_str()).collect::<Vec<_>>(),
            "Updated validation proxy services"
        );
        self.services.write().await.insert(fleet.to_string(), services);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_update_wins() {
        let updater = InMemoryValidationUpdater::new();
        let service = ProxiedService {
            id: "abc".into(),
            cluster_name: "petstore-80".into(),
            hostname: "petstore".into(),
            port: 80,
        };

        updater.update_services("default.default", vec![service.clone()]).await.unwrap();
        assert_eq!(updater.services("default.default").await, vec![service]);

        updater.update_services("default.default", vec![]).await.unwrap();
        assert!(updater.services("default.default").await.is_empty());
        assert!(updater.services("other.default").await.is_empty());
    }
}
