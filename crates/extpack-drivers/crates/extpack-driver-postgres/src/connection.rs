//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::sync::Mutex;
use postgres_types::to_sql_checked;
use tokio_postgres::{
    Client, NoTls, Row as PgRow,
    types::{FromSql, IsNull, ToSql, Type},
};
use extpack_core::{
    ColumnMeta, Connection, ExtpackError, QueryResult, Result, Row, StatementResult, Transaction,
    Value,
};

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        tracing::info!(host = %host, port = %port, database = %database, "connecting to PostgreSQL database");

        let mut config = tokio_postgres::Config::new();
        config.host(host).port(port).dbname(database);

        if let Some(u) = user {
            config.user(u);
        }
        if let Some(p) = password {
            config.password(p);
        }

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            ExtpackError::Connection(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        // The connection object performs the actual communication and has
        // to be driven on its own task.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!(host = %host, port = %port, database = %database, "PostgreSQL connection established");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let client = self.client.lock().await;
        let pg_params = values_to_pg(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows_affected = client
            .execute(sql, &param_refs)
            .await
            .map_err(classify_postgres_error)?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            is_query: false,
            result: None,
            affected_rows: rows_affected,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let client = self.client.lock().await;
        let pg_params = values_to_pg(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(sql, &param_refs)
            .await
            .map_err(classify_postgres_error)?;

        convert_rows(&pg_rows, start_time)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning PostgreSQL transaction");
        {
            let client = self.client.lock().await;
            client
                .batch_execute("BEGIN")
                .await
                .map_err(classify_postgres_error)?;
        }
        Ok(Box::new(PostgresTransaction {
            client: Arc::clone(&self.client),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// PostgreSQL transaction wrapper.
///
/// Issues raw `BEGIN` / `COMMIT` / `ROLLBACK` SQL so that it can share the
/// client `Arc<Mutex<…>>` without tokio-postgres' borrow-based transaction
/// lifetimes.
pub struct PostgresTransaction {
    client: Arc<Mutex<Client>>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!(
                "PostgreSQL transaction dropped without commit or rollback, issuing automatic rollback"
            );
            let client = Arc::clone(&self.client);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let client = client.lock().await;
                        if let Err(e) = client.batch_execute("ROLLBACK").await {
                            tracing::error!(error = %e, "automatic rollback on drop failed");
                        }
                    });
                }
                Err(_) => {
                    tracing::error!("no runtime available for automatic rollback on drop");
                }
            }
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing PostgreSQL transaction");

        if self.rolled_back {
            return Err(ExtpackError::Statement("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(ExtpackError::Statement("Transaction already committed".into()));
        }

        {
            let client = self.client.lock().await;
            client
                .batch_execute("COMMIT")
                .await
                .map_err(classify_postgres_error)?;
        }
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back PostgreSQL transaction");

        if self.committed {
            return Err(ExtpackError::Statement("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        {
            let client = self.client.lock().await;
            client
                .batch_execute("ROLLBACK")
                .await
                .map_err(classify_postgres_error)?;
        }
        self.rolled_back = true;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let client = self.client.lock().await;
        let pg_params = values_to_pg(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(sql, &param_refs)
            .await
            .map_err(classify_postgres_error)?;

        convert_rows(&pg_rows, start_time)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let client = self.client.lock().await;
        let pg_params = values_to_pg(params);
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows_affected = client
            .execute(sql, &param_refs)
            .await
            .map_err(classify_postgres_error)?;

        Ok(StatementResult {
            is_query: false,
            result: None,
            affected_rows: rows_affected,
        })
    }
}

/// Map tokio-postgres errors onto the extpack taxonomy using the server's
/// SQLSTATE code where one is available.
fn classify_postgres_error(error: tokio_postgres::Error) -> ExtpackError {
    let Some(db_error) = error.as_db_error() else {
        return ExtpackError::Statement(error.to_string());
    };

    let code = db_error.code().code();
    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }

    match code {
        // duplicate_table, duplicate_object, duplicate_function
        "42P07" | "42710" | "42723" => ExtpackError::DuplicateObject(message),
        "23505" => ExtpackError::Statement(format!(
            "duplicate value violates unique constraint: {}",
            message
        )),
        "23502" => ExtpackError::Statement(format!(
            "null value violates not-null constraint: {}",
            message
        )),
        _ => ExtpackError::Statement(format!("{} (code: {})", message, code)),
    }
}

/// Wrapper enum for converting extpack values to types implementing ToSql.
/// tokio-postgres requires owned values that implement ToSql, and integer
/// widths must match the target column type on the wire.
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

fn values_to_pg(values: &[Value]) -> Vec<PgValue> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Json(v) => PgValue::Json(v.clone()),
        })
        .collect()
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => match *ty {
                Type::INT8 => (*v as i64).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            PgValue::Int64(v) => match *ty {
                Type::INT4 => (*v as i32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Fallback for column types without a dedicated conversion: take the text
/// representation.
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let text = String::from_utf8(raw.to_vec())?;
        Ok(Self(text))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn convert_rows(pg_rows: &[PgRow], start_time: std::time::Instant) -> Result<QueryResult> {
    let mut columns: Vec<ColumnMeta> = Vec::new();
    let mut column_names: Vec<String> = Vec::new();

    if let Some(first) = pg_rows.first() {
        for (idx, col) in first.columns().iter().enumerate() {
            column_names.push(col.name().to_string());
            columns.push(ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                nullable: true,
                ordinal: idx,
            });
        }
    }

    let mut rows = Vec::with_capacity(pg_rows.len());
    for pg_row in pg_rows {
        let mut values = Vec::with_capacity(pg_row.len());
        for (idx, col) in pg_row.columns().iter().enumerate() {
            values.push(pg_to_value(pg_row, idx, col.type_())?);
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        id: uuid::Uuid::new_v4(),
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    })
}

fn pg_to_value(row: &PgRow, idx: usize, ty: &Type) -> Result<Value> {
    let map_err =
        |e: tokio_postgres::Error| ExtpackError::Statement(format!("column decode failed: {}", e));

    let value = match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(map_err)?
            .map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(map_err)?
            .map(|v| Value::Int64(v as i64)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(map_err)?
            .map(|v| Value::Int64(v as i64)),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(map_err)?
            .map(Value::Int64),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(map_err)?
            .map(|v| Value::Float64(v as f64)),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(map_err)?
            .map(Value::Float64),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::BPCHAR => row
            .try_get::<_, Option<String>>(idx)
            .map_err(map_err)?
            .map(Value::String),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map_err(map_err)?
            .map(Value::Bytes),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(map_err)?
            .map(Value::Json),
        _ => row
            .try_get::<_, Option<PgFallbackString>>(idx)
            .map_err(map_err)?
            .map(|v| Value::String(v.0)),
    };

    Ok(value.unwrap_or(Value::Null))
}
