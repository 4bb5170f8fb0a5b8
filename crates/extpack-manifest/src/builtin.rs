//! Built-in `spi_example` extension manifest
//!
//! The schema surface of the spi_example extension: a columnless
//! placeholder table, a seeded table with a sequence-assigned key, and six
//! function registrations bound to external symbols. The native
//! implementations here back those symbols for engines that bind
//! registrations in-process; they query through the installed connection
//! the way server-side implementations query through SPI.

use crate::{
    ArgSpec, ColumnSpec, ExtensionManifest, FunctionEntity, ReturnShape, SeedBatch, SqlType,
    TableEntity,
};
use extpack_core::{CallOutcome, Connection, ExtpackError, NativeRegistry, Result, Value};

/// The spi_example manifest as the original install script declares it.
///
/// The `foo` placeholder has no columns, so this form renders only on
/// dialects that can express that; use [`spi_example_sqlite`] for SQLite
/// targets.
pub fn spi_example() -> ExtensionManifest {
    spi_example_base().table_first(TableEntity::new("foo"))
}

/// The spi_example manifest without the columnless `foo` placeholder,
/// installable on SQLite.
pub fn spi_example_sqlite() -> ExtensionManifest {
    spi_example_base()
}

fn spi_example_base() -> ExtensionManifest {
    ExtensionManifest::new("spi_example", "1.0.0")
        .table(
            TableEntity::new("spi_example")
                .column(
                    ColumnSpec::new("id", SqlType::BigSerial)
                        .not_null()
                        .primary_key(),
                )
                .column(ColumnSpec::new("title", SqlType::Text)),
        )
        .seed(
            SeedBatch::new("spi_example", vec!["title"])
                .text_row("This is a test")
                .text_row("Hello There!")
                .text_row("I like pudding"),
        )
        .function(
            FunctionEntity::new(
                "spi_insert_title",
                "spi_insert_title_wrapper",
                ReturnShape::Scalar {
                    sql_type: SqlType::BigInt,
                    nullable: false,
                },
            )
            .arg("title", SqlType::Text)
            .strict(),
        )
        .function(
            FunctionEntity::new(
                "spi_insert_title2",
                "spi_insert_title2_wrapper",
                ReturnShape::RowTable {
                    columns: vec![
                        ArgSpec::new("id", SqlType::BigInt),
                        ArgSpec::new("title", SqlType::Text),
                    ],
                },
            )
            .arg("title", SqlType::Text)
            .strict(),
        )
        .function(
            FunctionEntity::new(
                "spi_query_by_id",
                "spi_query_by_id_wrapper",
                ReturnShape::Scalar {
                    sql_type: SqlType::Text,
                    nullable: true,
                },
            )
            .arg("id", SqlType::BigInt)
            .strict()
            .immutable()
            .parallel_safe(),
        )
        .function(
            FunctionEntity::new(
                "spi_query_title",
                "spi_query_title_wrapper",
                ReturnShape::Scalar {
                    sql_type: SqlType::BigInt,
                    nullable: true,
                },
            )
            .arg("title", SqlType::Text)
            .strict()
            .immutable()
            .parallel_safe(),
        )
        .function(
            FunctionEntity::new(
                "spi_query_random_id",
                "spi_query_random_id_wrapper",
                ReturnShape::Scalar {
                    sql_type: SqlType::BigInt,
                    nullable: true,
                },
            )
            .strict(),
        )
        .function(FunctionEntity::new(
            "spi_return_query",
            "spi_return_query_wrapper",
            ReturnShape::RowTable {
                columns: vec![
                    ArgSpec::new("id", SqlType::BigInt),
                    ArgSpec::new("title", SqlType::Text),
                ],
            },
        ))
}

impl ExtensionManifest {
    /// Insert a table at the front of the declaration order
    fn table_first(mut self, table: TableEntity) -> Self {
        self.tables.insert(0, table);
        self
    }
}

/// Native implementations for the spi_example symbols.
///
/// STRICT short-circuiting happens before dispatch, so these assume their
/// arguments are non-null.
pub fn spi_example_natives() -> NativeRegistry {
    let mut registry = NativeRegistry::new();

    registry.register_fn("spi_insert_title_wrapper", |conn: &dyn Connection, args: Vec<Value>| {
        Box::pin(async move {
            let title = text_arg(&args, 0, "spi_insert_title", "title")?;
            let id = insert_title(conn, &title).await?;
            Ok(CallOutcome::Scalar(Value::Int64(id)))
        })
    });

    registry.register_fn("spi_insert_title2_wrapper", |conn: &dyn Connection, args: Vec<Value>| {
        Box::pin(async move {
            let title = text_arg(&args, 0, "spi_insert_title2", "title")?;
            let id = insert_title(conn, &title).await?;
            let rows = conn
                .query(
                    &format!(
                        "SELECT \"id\", \"title\" FROM \"spi_example\" WHERE \"id\" = {}",
                        id
                    ),
                    &[],
                )
                .await?;
            Ok(CallOutcome::Rows(rows))
        })
    });

    registry.register_fn("spi_query_by_id_wrapper", |conn: &dyn Connection, args: Vec<Value>| {
        Box::pin(async move {
            let id = int_arg(&args, 0, "spi_query_by_id", "id")?;
            let result = conn
                .query(
                    &format!(
                        "SELECT \"title\" FROM \"spi_example\" WHERE \"id\" = {}",
                        id
                    ),
                    &[],
                )
                .await?;
            Ok(CallOutcome::Scalar(first_value(&result)))
        })
    });

    registry.register_fn("spi_query_title_wrapper", |conn: &dyn Connection, args: Vec<Value>| {
        Box::pin(async move {
            let title = text_arg(&args, 0, "spi_query_title", "title")?;
            let result = conn
                .query(
                    &format!(
                        "SELECT \"id\" FROM \"spi_example\" WHERE \"title\" = '{}' ORDER BY \"id\" LIMIT 1",
                        title.replace('\'', "''")
                    ),
                    &[],
                )
                .await?;
            Ok(CallOutcome::Scalar(first_value(&result)))
        })
    });

    registry.register_fn("spi_query_random_id_wrapper", |conn: &dyn Connection, _args: Vec<Value>| {
        Box::pin(async move {
            let result = conn
                .query(
                    "SELECT \"id\" FROM \"spi_example\" ORDER BY random() LIMIT 1",
                    &[],
                )
                .await?;
            Ok(CallOutcome::Scalar(first_value(&result)))
        })
    });

    registry.register_fn("spi_return_query_wrapper", |conn: &dyn Connection, _args: Vec<Value>| {
        Box::pin(async move {
            let rows = conn
                .query(
                    "SELECT \"id\", \"title\" FROM \"spi_example\" ORDER BY \"id\"",
                    &[],
                )
                .await?;
            Ok(CallOutcome::Rows(rows))
        })
    });

    registry
}

/// Insert a title and return the sequence-assigned id
async fn insert_title(conn: &dyn Connection, title: &str) -> Result<i64> {
    let escaped = title.replace('\'', "''");
    if conn.driver_name() == "postgres" {
        let result = conn
            .query(
                &format!(
                    "INSERT INTO \"spi_example\" (\"title\") VALUES ('{}') RETURNING \"id\"",
                    escaped
                ),
                &[],
            )
            .await?;
        return result
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExtpackError::Statement("INSERT returned no id".into()));
    }

    conn.execute(
        &format!(
            "INSERT INTO \"spi_example\" (\"title\") VALUES ('{}')",
            escaped
        ),
        &[],
    )
    .await?;
    let result = conn.query("SELECT last_insert_rowid()", &[]).await?;
    result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExtpackError::Statement("last_insert_rowid returned no value".into()))
}

fn first_value(result: &extpack_core::QueryResult) -> Value {
    result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .cloned()
        .unwrap_or(Value::Null)
}

fn text_arg(args: &[Value], index: usize, function: &str, name: &str) -> Result<String> {
    args.get(index)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            ExtpackError::Statement(format!("{}: argument '{}' must be text", function, name))
        })
}

fn int_arg(args: &[Value], index: usize, function: &str, name: &str) -> Result<i64> {
    args.get(index).and_then(|v| v.as_i64()).ok_or_else(|| {
        ExtpackError::Statement(format!("{}: argument '{}' must be an integer", function, name))
    })
}
