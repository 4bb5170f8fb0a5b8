//! Extpack Drivers - database driver implementations
//!
//! This crate provides concrete implementations of the driver traits
//! defined in `extpack-core`, plus the registry that resolves driver names
//! to instances.

#[cfg(feature = "postgres")]
pub use extpack_driver_postgres as postgres;
#[cfg(feature = "sqlite")]
pub use extpack_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from extpack-core
pub use extpack_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, ExtpackError,
    QueryResult, Result, Row, StatementResult, Transaction, Value,
};

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use sqlite::SqliteConnection;

    #[tokio::test]
    async fn sqlite_connection_end_to_end() {
        let conn = SqliteConnection::open(":memory:").expect("Failed to open in-memory db");

        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
            &[],
        )
        .await
        .expect("Failed to create table");

        conn.execute(
            "INSERT INTO users (name, email) VALUES ('Alice', 'alice@example.com')",
            &[],
        )
        .await
        .expect("Failed to insert");

        let result = conn
            .query("SELECT * FROM users", &[])
            .await
            .expect("Failed to query");

        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn registry_resolves_builtin_drivers() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.has("sqlite"));
        let driver = registry.get("sqlite").expect("sqlite driver registered");
        assert!(driver.capabilities().supports_transactions);
        assert!(!driver.capabilities().supports_sql_function_registration);
    }
}
