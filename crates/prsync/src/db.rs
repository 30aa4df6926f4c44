//! Database connection utilities.

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use crate::concurrency::DEFAULT_POOL_SIZE;

/// Configure SQLite-specific pragmas for better performance and concurrency.
///
/// This sets:
/// - `journal_mode=WAL` - readers don't block the writer
/// - `busy_timeout=5000` - wait up to 5 seconds for locks instead of failing immediately
/// - `synchronous=NORMAL` - safe with WAL and faster than FULL
/// - `foreign_keys=ON` - enforce the cascade rules of the schema
async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::{ConnectionTrait, Statement};

    for pragma in [
        "PRAGMA journal_mode=WAL",
        "PRAGMA busy_timeout=5000",
        "PRAGMA synchronous=NORMAL",
        "PRAGMA foreign_keys=ON",
    ] {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            pragma.to_string(),
        ))
        .await?;
    }

    Ok(())
}

/// Whether `database_url` names a private in-memory SQLite database.
///
/// Such a database lives and dies with its single connection, so the pool
/// must never open a second one.
pub fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite:")
        && (database_url.contains(":memory:") || database_url.contains("mode=memory"))
}

fn connect_options(database_url: &str, max_connections: u32) -> ConnectOptions {
    let max_connections = if is_in_memory(database_url) {
        1
    } else {
        max_connections.max(1)
    };

    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    options
}

/// Establish a connection to the database with the default pool size.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    connect_with_pool(database_url, DEFAULT_POOL_SIZE as u32).await
}

/// Establish a connection pool of at most `max_connections` connections.
///
/// Size the pool after the worker pool: every in-flight pull request commit
/// holds one connection for the length of its transaction. In-memory SQLite
/// is always pinned to one connection.
///
/// # Arguments
/// * `database_url` - Database connection string (e.g., `sqlite://prsync.db?mode=rwc` or `sqlite::memory:`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect_with_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(connect_options(database_url, max_connections)).await?;

    if database_url.starts_with("sqlite:") {
        configure_sqlite(&db).await?;
    }

    Ok(db)
}

/// Establish a connection and run all pending migrations.
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established or migrations fail.
///
/// # Example
/// ```ignore
/// let db = prsync::connect_and_migrate("sqlite://prsync.db?mode=rwc").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    connect_and_migrate_with_pool(database_url, DEFAULT_POOL_SIZE as u32).await
}

/// [`connect_with_pool`] followed by all pending migrations.
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate_with_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect_with_pool(database_url, max_connections).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_configure_sqlite_runs_all_pragmas() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results((0..4).map(|_| MockExecResult {
                rows_affected: 0,
                last_insert_id: 0,
            }))
            .into_connection();

        configure_sqlite(&db)
            .await
            .expect("mock sqlite pragma execs should succeed");

        assert_eq!(db.into_transaction_log().len(), 4);
    }

    #[test]
    fn test_in_memory_urls_are_detected() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:shared?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite:///tmp/prsync.db?mode=rwc"));
        assert!(!is_in_memory("postgres:///prsync"));
    }

    #[test]
    fn test_in_memory_pool_is_pinned_to_one_connection() {
        let options = connect_options("sqlite::memory:", 8);
        assert_eq!(options.get_max_connections(), Some(1));

        let options = connect_options("sqlite:///tmp/prsync.db?mode=rwc", 8);
        assert_eq!(options.get_max_connections(), Some(8));

        let options = connect_options("sqlite:///tmp/prsync.db?mode=rwc", 0);
        assert_eq!(options.get_max_connections(), Some(1));
    }

    #[tokio::test]
    async fn test_connect_returns_error_for_invalid_database_url() {
        let err = connect("this-is-not-a-db-url")
            .await
            .expect_err("invalid URL should error");
        let msg = err.to_string().to_ascii_lowercase();
        assert!(
            msg.contains("error") || msg.contains("invalid") || msg.contains("url"),
            "unexpected error message: {err}"
        );
    }
}
