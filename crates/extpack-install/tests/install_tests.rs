//! End-to-end install tests over the SQLite driver

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use extpack_core::{CallOutcome, Connection, ExtpackError, NativeRegistry, Value};
use extpack_driver_sqlite::SqliteConnection;
use extpack_install::{Installation, Installer, Verifier};
use extpack_manifest::{
    Dialect, ExtensionManifest, FunctionEntity, ReturnShape, ScriptRenderer, SqlType, TableEntity,
    ColumnSpec, spi_example_natives, spi_example_sqlite,
};

async fn install_spi_example(conn: &SqliteConnection) -> Installation {
    let script = ScriptRenderer::new(Dialect::Sqlite)
        .render(&spi_example_sqlite())
        .expect("render");
    Installer::with_registry(spi_example_natives())
        .install(conn, &script)
        .await
        .expect("install")
}

#[tokio::test]
async fn install_seeds_three_rows_with_increasing_ids() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let installation = install_spi_example(&conn).await;

    assert_eq!(installation.report.statements_applied, 2);
    assert_eq!(installation.report.rows_seeded, 3);
    assert_eq!(installation.report.functions_registered, 6);

    let result = conn
        .query("SELECT id, title FROM spi_example ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 3);

    let ids: Vec<i64> = result
        .rows
        .iter()
        .filter_map(|r| r.get(0).and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let titles: Vec<&str> = result
        .rows
        .iter()
        .filter_map(|r| r.get(1).and_then(|v| v.as_str()))
        .collect();
    assert_eq!(
        titles,
        vec!["This is a test", "Hello There!", "I like pudding"]
    );
}

#[tokio::test]
async fn verifier_accepts_a_fresh_install() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    install_spi_example(&conn).await;

    let report = Verifier::new(Dialect::Sqlite)
        .verify(&conn, &spi_example_sqlite())
        .await
        .unwrap();
    assert!(report.ok(), "failures: {:?}", report.failures());
}

#[tokio::test]
async fn reinstall_fails_with_duplicate_object() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    install_spi_example(&conn).await;

    let script = ScriptRenderer::new(Dialect::Sqlite)
        .render(&spi_example_sqlite())
        .unwrap();
    let err = Installer::with_registry(spi_example_natives())
        .install(&conn, &script)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtpackError::DuplicateObject(_)), "{err}");
}

#[tokio::test]
async fn failed_install_rolls_back_earlier_statements() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    install_spi_example(&conn).await;

    // A second manifest that creates a fresh table before colliding with
    // the installed one. The collision must abort the whole script.
    let manifest = ExtensionManifest::new("collider", "0.1.0")
        .table(TableEntity::new("extra").column(ColumnSpec::new("x", SqlType::Integer)))
        .table(
            TableEntity::new("spi_example")
                .column(ColumnSpec::new("id", SqlType::BigSerial).not_null().primary_key()),
        );
    let script = ScriptRenderer::new(Dialect::Sqlite).render(&manifest).unwrap();

    let err = Installer::new().install(&conn, &script).await.unwrap_err();
    assert!(matches!(err, ExtpackError::DuplicateObject(_)));

    let result = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'extra'",
            &[],
        )
        .await
        .unwrap();
    assert!(!result.has_rows(), "rolled-back table still present");
}

#[tokio::test]
async fn undefined_symbol_aborts_before_touching_the_database() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let script = ScriptRenderer::new(Dialect::Sqlite)
        .render(&spi_example_sqlite())
        .unwrap();

    // Empty symbol table: nothing resolves.
    let err = Installer::new().install(&conn, &script).await.unwrap_err();
    assert!(matches!(err, ExtpackError::UndefinedSymbol(_)));

    let result = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'spi_example'",
            &[],
        )
        .await
        .unwrap();
    assert!(!result.has_rows());
}

#[tokio::test]
async fn bound_functions_are_callable_by_declared_name() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let installation = install_spi_example(&conn).await;
    let functions = &installation.functions;

    let outcome = functions
        .call(&conn, "spi_query_by_id", &[Value::Int64(1)])
        .await
        .unwrap();
    assert_eq!(
        outcome.as_scalar().and_then(|v| v.as_str()),
        Some("This is a test")
    );

    let outcome = functions
        .call(
            &conn,
            "spi_query_title",
            &[Value::String("Hello There!".into())],
        )
        .await
        .unwrap();
    assert_eq!(outcome.as_scalar().and_then(|v| v.as_i64()), Some(2));

    let outcome = functions
        .call(&conn, "spi_query_by_id", &[Value::Int64(999)])
        .await
        .unwrap();
    assert_eq!(outcome.as_scalar(), Some(&Value::Null));

    let outcome = functions
        .call(&conn, "spi_query_random_id", &[])
        .await
        .unwrap();
    let id = outcome.as_scalar().and_then(|v| v.as_i64()).unwrap();
    assert!((1..=3).contains(&id));
}

#[tokio::test]
async fn insert_functions_append_rows() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let installation = install_spi_example(&conn).await;
    let functions = &installation.functions;

    let outcome = functions
        .call(
            &conn,
            "spi_insert_title",
            &[Value::String("Bread pudding".into())],
        )
        .await
        .unwrap();
    assert_eq!(outcome.as_scalar().and_then(|v| v.as_i64()), Some(4));

    let outcome = functions
        .call(
            &conn,
            "spi_insert_title2",
            &[Value::String("More pudding".into())],
        )
        .await
        .unwrap();
    let rows = outcome.as_rows().unwrap();
    assert_eq!(rows.row_count(), 1);
    assert_eq!(rows.rows[0].get(0).and_then(|v| v.as_i64()), Some(5));
    assert_eq!(
        rows.rows[0].get(1).and_then(|v| v.as_str()),
        Some("More pudding")
    );

    let outcome = functions.call(&conn, "spi_return_query", &[]).await.unwrap();
    assert_eq!(outcome.as_rows().unwrap().row_count(), 5);
}

#[tokio::test]
async fn strict_functions_skip_native_code_on_null() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));

    let manifest = ExtensionManifest::new("probe", "0.1.0")
        .function(
            FunctionEntity::new(
                "probe_scalar",
                "probe_scalar_wrapper",
                ReturnShape::Scalar {
                    sql_type: SqlType::BigInt,
                    nullable: true,
                },
            )
            .arg("x", SqlType::BigInt)
            .strict(),
        )
        .function(
            FunctionEntity::new(
                "probe_rows",
                "probe_rows_wrapper",
                ReturnShape::SetOf {
                    sql_type: SqlType::BigInt,
                },
            )
            .arg("x", SqlType::BigInt)
            .strict(),
        );

    let mut registry = NativeRegistry::new();
    let counter = Arc::clone(&invocations);
    registry.register_fn("probe_scalar_wrapper", move |_conn: &dyn Connection, _args: Vec<Value>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(CallOutcome::Scalar(Value::Int64(7))) })
    });
    let counter = Arc::clone(&invocations);
    registry.register_fn("probe_rows_wrapper", move |_conn: &dyn Connection, _args: Vec<Value>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(CallOutcome::Rows(extpack_core::QueryResult::empty())) })
    });

    let script = ScriptRenderer::new(Dialect::Sqlite).render(&manifest).unwrap();
    let installation = Installer::with_registry(registry)
        .install(&conn, &script)
        .await
        .unwrap();

    // NULL argument: scalar shape yields NULL, set shape yields no rows,
    // and the native code never runs.
    let outcome = installation
        .functions
        .call(&conn, "probe_scalar", &[Value::Null])
        .await
        .unwrap();
    assert_eq!(outcome.as_scalar(), Some(&Value::Null));

    let outcome = installation
        .functions
        .call(&conn, "probe_rows", &[Value::Null])
        .await
        .unwrap();
    assert_eq!(outcome.as_rows().unwrap().row_count(), 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    let outcome = installation
        .functions
        .call(&conn, "probe_scalar", &[Value::Int64(1)])
        .await
        .unwrap();
    assert_eq!(outcome.as_scalar().and_then(|v| v.as_i64()), Some(7));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn call_contract_is_enforced() {
    let conn = SqliteConnection::open(":memory:").unwrap();
    let installation = install_spi_example(&conn).await;

    let err = installation
        .functions
        .call(&conn, "spi_query_by_id", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("takes 1 argument"));

    let err = installation
        .functions
        .call(&conn, "no_such_function", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ExtpackError::NotFound(_)));
}

#[tokio::test]
async fn install_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ext.db");
    let path_str = path.to_string_lossy().to_string();

    {
        let conn = SqliteConnection::open(&path_str).unwrap();
        install_spi_example(&conn).await;
    }

    let conn = SqliteConnection::open(&path_str).unwrap();
    let result = conn
        .query("SELECT count(*) FROM spi_example", &[])
        .await
        .unwrap();
    assert_eq!(result.rows[0].get(0).and_then(|v| v.as_i64()), Some(3));
}
