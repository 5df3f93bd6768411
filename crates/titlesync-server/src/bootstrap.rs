//! Wiring the configured store, shared cache and title service together.

use std::sync::Arc;

use anyhow::Context;
use titlesync_db_memory::InMemoryTitleStore;
use titlesync_db_postgres::PostgresTitleStore;
use titlesync_storage::DynTitleStore;

use crate::cache::{SharedCache, create_shared_cache};
use crate::config::{AppConfig, StorageBackend};
use crate::service::{ServiceSettings, TitleService};

/// A running title stack.
///
/// Startup order: durable store (fatal on failure) → shared cache (degrades
/// to disabled) → title service with its invalidation listener.
pub struct TitleRuntime {
    service: TitleService,
    store: DynTitleStore,
}

impl TitleRuntime {
    pub async fn start(config: &AppConfig) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        store
            .health_check()
            .await
            .context("durable store health check failed")?;

        let shared = create_shared_cache(&config.redis, &config.cache).await;
        Ok(Self::with_parts(store, shared, ServiceSettings::from(&config.cache)))
    }

    /// Assemble a runtime from already constructed parts.
    pub fn with_parts(store: DynTitleStore, shared: SharedCache, settings: ServiceSettings) -> Self {
        let service = TitleService::new(Arc::clone(&store), shared, settings);
        Self { service, store }
    }

    pub fn service(&self) -> &TitleService {
        &self.service
    }

    pub fn store(&self) -> &DynTitleStore {
        &self.store
    }

    /// Graceful shutdown: drain mutations, stop the listener, clear the
    /// local cache, then close the store.
    pub async fn shutdown(self) {
        tracing::info!("shutting down title runtime");
        self.service.shutdown().await;
        self.store.close().await;
        tracing::info!("title runtime stopped");
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<DynTitleStore> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PostgresTitleStore::new(config.storage.postgres.to_store_config())
                .await
                .context("failed to connect to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory title store, data will not survive a restart");
            Ok(Arc::new(InMemoryTitleStore::new()))
        }
    }
}
