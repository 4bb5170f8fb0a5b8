//! PostgreSQL driver implementation

use crate::PostgresConnection;
use async_trait::async_trait;
use std::sync::Arc;
use extpack_core::{
    Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, ExtpackError, Result,
};

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_port(&self) -> Option<u16> {
        Some(5432)
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_zero_column_tables: true,
            supports_sql_function_registration: true,
            supports_native_binding: false,
            supports_set_returning_functions: true,
            max_identifier_length: Some(63),
        }
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let host = config
            .get_string("host")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 5432 };
        let database = config
            .get_string("database")
            .unwrap_or_else(|| "postgres".to_string());
        let user = config
            .get_string("user")
            .or_else(|| config.get_string("username"));
        let password = config.get_string("password");

        let conn = PostgresConnection::connect(
            &host,
            port,
            &database,
            user.as_deref(),
            password.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            ExtpackError::Connection(format!("Failed to connect to PostgreSQL database: {}", e))
        })?;

        Ok(Arc::new(conn))
    }

    #[tracing::instrument(skip(self, config))]
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        tracing::debug!("testing PostgreSQL connection");
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        Ok(())
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 5432 };
        let database = config
            .get_string("database")
            .unwrap_or_else(|| "postgres".to_string());
        match config.get_string("user").or_else(|| config.get_string("username")) {
            Some(user) => format!("postgres://{}@{}:{}/{}", user, host, port, database),
            None => format!("postgres://{}:{}/{}", host, port, database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_connection_string() {
        let driver = PostgresDriver::new();
        let config = ConnectionConfig::new_postgres("db.example.com", 5433, "apps", "svc");
        assert_eq!(
            driver.build_connection_string(&config),
            "postgres://svc@db.example.com:5433/apps"
        );
    }

    #[test]
    fn defaults_apply_when_config_is_sparse() {
        let driver = PostgresDriver::new();
        let config = ConnectionConfig::new("postgres", "bare");
        assert_eq!(
            driver.build_connection_string(&config),
            "postgres://localhost:5432/postgres"
        );
    }
}
