//! Query implementations, one per store operation.
//!
//! Each function is a single statement against the pool; nothing here opens
//! a transaction spanning both tables.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use titlesync_core::{HolderId, TitleCollection, TitleRecord, now_millis};
use titlesync_storage::StorageError;

use crate::error::query_error;

/// Loads every title owned by `holder`.
pub async fn load_titles(pool: &PgPool, holder: HolderId) -> Result<TitleCollection, StorageError> {
    let rows: Vec<(String, i64)> =
        query_as("SELECT title_name, obtained_at FROM player_titles WHERE holder_id = $1")
            .bind(*holder.as_uuid())
            .fetch_all(pool)
            .await
            .map_err(|e| query_error("load_titles", e))?;

    Ok(rows
        .into_iter()
        .map(|(title, obtained_at)| TitleRecord::new(holder, title, obtained_at))
        .collect())
}

/// Inserts a title or refreshes `obtained_at` on conflict.
pub async fn upsert_title(
    pool: &PgPool,
    holder: HolderId,
    title: &str,
    acquired_at: i64,
) -> Result<bool, StorageError> {
    let result = query(
        r#"
        INSERT INTO player_titles (holder_id, title_name, obtained_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (holder_id, title_name)
        DO UPDATE SET obtained_at = EXCLUDED.obtained_at
        "#,
    )
    .bind(*holder.as_uuid())
    .bind(title)
    .bind(acquired_at)
    .execute(pool)
    .await
    .map_err(|e| query_error("upsert_title", e))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a title; returns whether a row was removed.
pub async fn delete_title(
    pool: &PgPool,
    holder: HolderId,
    title: &str,
) -> Result<bool, StorageError> {
    let result = query("DELETE FROM player_titles WHERE holder_id = $1 AND title_name = $2")
        .bind(*holder.as_uuid())
        .bind(title)
        .execute(pool)
        .await
        .map_err(|e| query_error("delete_title", e))?;

    Ok(result.rows_affected() > 0)
}

/// Reads the selected title. A row with a NULL title counts as no selection.
pub async fn get_selected(pool: &PgPool, holder: HolderId) -> Result<Option<String>, StorageError> {
    let title: Option<Option<String>> =
        query_scalar("SELECT title_name FROM selected_titles WHERE holder_id = $1")
            .bind(*holder.as_uuid())
            .fetch_optional(pool)
            .await
            .map_err(|e| query_error("get_selected", e))?;

    Ok(title.flatten())
}

/// Upserts the selection, or deletes the row when clearing it.
pub async fn set_selected(
    pool: &PgPool,
    holder: HolderId,
    title: Option<&str>,
) -> Result<(), StorageError> {
    match title {
        Some(title) => {
            query(
                r#"
                INSERT INTO selected_titles (holder_id, title_name, updated_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (holder_id)
                DO UPDATE SET title_name = EXCLUDED.title_name, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(*holder.as_uuid())
            .bind(title)
            .bind(now_millis())
            .execute(pool)
            .await
            .map_err(|e| query_error("set_selected", e))?;
        }
        None => {
            query("DELETE FROM selected_titles WHERE holder_id = $1")
                .bind(*holder.as_uuid())
                .execute(pool)
                .await
                .map_err(|e| query_error("set_selected", e))?;
        }
    }
    Ok(())
}
