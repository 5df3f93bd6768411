//! Schema management for the PostgreSQL store.
//!
//! Two tables hold all persisted state:
//!
//! - `player_titles`: one row per owned title, keyed by (holder, title)
//! - `selected_titles`: at most one row per holder; absent row = no selection

use sqlx_core::query::query;
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

/// Owned-titles table name.
pub const PLAYER_TITLES_TABLE: &str = "player_titles";

/// Selected-title table name.
pub const SELECTED_TITLES_TABLE: &str = "selected_titles";

const CREATE_PLAYER_TITLES: &str = r#"
CREATE TABLE IF NOT EXISTS player_titles (
    holder_id   UUID         NOT NULL,
    title_name  VARCHAR(200) NOT NULL,
    obtained_at BIGINT       NOT NULL,
    PRIMARY KEY (holder_id, title_name)
)
"#;

const CREATE_SELECTED_TITLES: &str = r#"
CREATE TABLE IF NOT EXISTS selected_titles (
    holder_id  UUID PRIMARY KEY,
    title_name VARCHAR(200),
    updated_at BIGINT NOT NULL
)
"#;

/// Creates both tables if they do not exist.
///
/// Idempotent; called on every startup. A failure here means the service
/// cannot run.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for ddl in [CREATE_PLAYER_TITLES, CREATE_SELECTED_TITLES] {
        query(ddl)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::Schema(e.to_string()))?;
    }

    info!(
        tables = ?[PLAYER_TITLES_TABLE, SELECTED_TITLES_TABLE],
        "Title tables verified"
    );
    Ok(())
}
