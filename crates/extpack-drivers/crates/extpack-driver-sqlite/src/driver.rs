//! SQLite driver implementation

use crate::SqliteConnection;
use async_trait::async_trait;
use std::sync::Arc;
use extpack_core::{
    Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, ExtpackError, Result,
};

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_zero_column_tables: false,
            supports_sql_function_registration: false,
            supports_native_binding: true,
            supports_set_returning_functions: true,
            max_identifier_length: None,
        }
    }

    #[tracing::instrument(skip(self, config), fields(database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let path = config.get_string("database").ok_or_else(|| {
            ExtpackError::Configuration("SQLite connection requires a database path".into())
        })?;
        let conn = SqliteConnection::open(&path)?;
        Ok(Arc::new(conn))
    }

    #[tracing::instrument(skip(self, config))]
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        Ok(())
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        format!(
            "sqlite://{}",
            config.get_string("database").unwrap_or_default()
        )
    }
}
