use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open (creating if needed) the index database inside `store_dir`.
pub async fn connect(store_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(store_dir)?;
    let db_path = store_dir.join("index.sqlite");

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an existing index read-write without creating anything. Returns
/// `None` when the directory holds no index.
pub async fn connect_existing(store_dir: &Path) -> Result<Option<SqlitePool>> {
    let db_path = store_dir.join("index.sqlite");
    if !db_path.exists() {
        return Ok(None);
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(Some(pool))
}
