pub mod migrations;
pub mod models;
pub mod repos;
pub mod store;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::config::DatabaseConfig;
use crate::error::AppError;

pub use store::SqliteStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection customizer that sets per-connection SQLite pragmas.
#[derive(Debug)]
struct SqlitePragmaCustomizer;

impl CustomizeConnection<rusqlite::Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -8000;",
        )?;
        Ok(())
    }
}

/// Open the database named by `config`, enable WAL and run migrations.
/// `:memory:` yields a single-connection in-memory pool.
pub fn init_db(config: &DatabaseConfig) -> Result<DbPool, AppError> {
    if config.is_memory() {
        return init_memory_db();
    }

    let db_path = Path::new(&config.path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path.display(), "Initializing database");

    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_customizer(Box::new(SqlitePragmaCustomizer))
        .build(manager)?;

    // Journal mode is database-wide, set it once
    {
        let conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        tracing::debug!("SQLite pragmas configured (WAL, FK, busy_timeout)");
    }

    {
        let conn = pool.get()?;
        migrations::run(&conn)?;
    }

    tracing::info!("Database initialized successfully");
    Ok(pool)
}

/// In-memory database. Every pooled connection would open its own empty
/// database, so the pool holds exactly one and never recycles it.
pub fn init_memory_db() -> Result<DbPool, AppError> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .min_idle(Some(1))
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_customizer(Box::new(SqlitePragmaCustomizer))
        .build(manager)?;

    let conn = pool.get()?;
    migrations::run(&conn)?;
    drop(conn);
    Ok(pool)
}

#[cfg(test)]
pub fn init_test_db() -> Result<DbPool, AppError> {
    init_memory_db()
}
