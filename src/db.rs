//! SQLite pool construction.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::Config;
use crate::migrate;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool, creating the database file and its directory on first use.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory: {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "database pool ready");
    Ok(pool)
}

/// [`connect`] followed by the schema migrations. Used by every entry point
/// that serves or mutates data.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(pool)
}
