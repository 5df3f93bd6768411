//! PostgreSQL implementation of the TitleStore trait.

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use titlesync_core::{HolderId, TitleCollection};
use titlesync_storage::{StorageError, TitleStore};
use tracing::{info, instrument};

use crate::config::PostgresConfig;
use crate::pool::{self, mask_password};
use crate::queries;
use crate::schema;

/// PostgreSQL-backed title store.
#[derive(Debug, Clone)]
pub struct PostgresTitleStore {
    pool: PgPool,
}

impl PostgresTitleStore {
    /// Creates a new store with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool (failing fast if the database is unreachable)
    /// 2. Create the tables (if `ensure_schema` is set)
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or the schema cannot
    /// be verified. Both are fatal for startup.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;
        let store = Self { pool };

        if config.ensure_schema {
            store.ensure_schema().await?;
        }

        info!(url = %mask_password(&config.url), "PostgreSQL title store ready");
        Ok(store)
    }

    /// Creates a store from an existing connection pool.
    ///
    /// The schema is not created automatically.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TitleStore for PostgresTitleStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        schema::ensure_schema(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(%holder))]
    async fn load_titles(&self, holder: HolderId) -> Result<TitleCollection, StorageError> {
        queries::load_titles(&self.pool, holder).await
    }

    #[instrument(skip_all, fields(%holder, title))]
    async fn upsert_title(
        &self,
        holder: HolderId,
        title: &str,
        acquired_at: i64,
    ) -> Result<bool, StorageError> {
        queries::upsert_title(&self.pool, holder, title, acquired_at).await
    }

    #[instrument(skip_all, fields(%holder, title))]
    async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool, StorageError> {
        queries::delete_title(&self.pool, holder, title).await
    }

    #[instrument(skip_all, fields(%holder))]
    async fn get_selected(&self, holder: HolderId) -> Result<Option<String>, StorageError> {
        queries::get_selected(&self.pool, holder).await
    }

    #[instrument(skip_all, fields(%holder))]
    async fn set_selected(
        &self,
        holder: HolderId,
        title: Option<&str>,
    ) -> Result<(), StorageError> {
        queries::set_selected(&self.pool, holder, title).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        pool::test_connection(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}
