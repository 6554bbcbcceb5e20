//! SQLite connection pooling.
//!
//! One small WAL-mode pool per command or server process, opened against
//! the file named in `[db].path`. The index, query history, and tickets all
//! live in this single database.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Open (or create) the database at `path` and return a pool.
///
/// Missing parent directories are created, so `askdocs init` works from a
/// fresh checkout with the example config's `data/` path.
pub async fn open_pool(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
