//! Tests for manifest modeling and script rendering

use super::*;
use extpack_core::ExtpackError;

fn sample_manifest() -> ExtensionManifest {
    ExtensionManifest::new("sample", "0.1.0")
        .table(
            TableEntity::new("items")
                .column(
                    ColumnSpec::new("id", SqlType::BigSerial)
                        .not_null()
                        .primary_key(),
                )
                .column(ColumnSpec::new("name", SqlType::Text)),
        )
        .seed(
            SeedBatch::new("items", vec!["name"])
                .text_row("first")
                .text_row("O'Brien"),
        )
}

#[test]
fn render_order_is_tables_seeds_functions() {
    let script = ScriptRenderer::new(Dialect::Postgres)
        .render(&spi_example())
        .unwrap();

    let kinds: Vec<&str> = script
        .steps
        .iter()
        .map(|step| match step {
            InstallStep::Sql { kind, .. } => match kind {
                StepKind::CreateTable => "table",
                StepKind::SeedRows => "seed",
                StepKind::CreateFunction => "function",
            },
            InstallStep::BindFunction { .. } => "bind",
        })
        .collect();

    assert_eq!(
        kinds,
        vec![
            "table", "table", "seed", "function", "function", "function", "function", "function",
            "function"
        ]
    );
    assert_eq!(script.steps[0].object(), "foo");
    assert_eq!(script.steps[1].object(), "spi_example");
}

#[test]
fn renders_zero_column_table_on_postgres() {
    let script = ScriptRenderer::new(Dialect::Postgres)
        .render(&spi_example())
        .unwrap();

    let InstallStep::Sql { sql, .. } = &script.steps[0] else {
        panic!("expected SQL step");
    };
    assert_eq!(sql, "CREATE TABLE \"foo\" ()");
}

#[test]
fn zero_column_table_is_a_capability_error_on_sqlite() {
    let err = ScriptRenderer::new(Dialect::Sqlite)
        .render(&spi_example())
        .unwrap_err();
    assert!(matches!(err, ExtpackError::NotSupported(_)));
}

#[test]
fn renders_serial_primary_key_per_dialect() {
    let pg = ScriptRenderer::new(Dialect::Postgres)
        .render(&sample_manifest())
        .unwrap();
    let InstallStep::Sql { sql, .. } = &pg.steps[0] else {
        panic!("expected SQL step");
    };
    assert!(sql.contains("\"id\" bigserial NOT NULL PRIMARY KEY"));
    assert!(sql.contains("\"name\" text"));
    assert!(!sql.contains("IF NOT EXISTS"));

    let lite = ScriptRenderer::new(Dialect::Sqlite)
        .render(&sample_manifest())
        .unwrap();
    let InstallStep::Sql { sql, .. } = &lite.steps[0] else {
        panic!("expected SQL step");
    };
    assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"));
}

#[test]
fn renders_seed_batch_as_one_insert() {
    let script = ScriptRenderer::new(Dialect::Postgres)
        .render(&sample_manifest())
        .unwrap();
    let InstallStep::Sql { kind, sql, .. } = &script.steps[1] else {
        panic!("expected SQL step");
    };
    assert_eq!(*kind, StepKind::SeedRows);
    assert_eq!(
        sql,
        "INSERT INTO \"items\" (\"name\") VALUES ('first'), ('O''Brien')"
    );
}

#[test]
fn renders_function_registration_clauses() {
    let script = ScriptRenderer::new(Dialect::Postgres)
        .render(&spi_example())
        .unwrap();

    let function_sql: Vec<&String> = script
        .steps
        .iter()
        .filter_map(|step| match step {
            InstallStep::Sql {
                kind: StepKind::CreateFunction,
                sql,
                ..
            } => Some(sql),
            _ => None,
        })
        .collect();
    assert_eq!(function_sql.len(), 6);

    let insert_title = function_sql[0];
    assert_eq!(
        insert_title.as_str(),
        "CREATE FUNCTION \"spi_insert_title\"(\"title\" text) RETURNS bigint STRICT \
         LANGUAGE c AS 'MODULE_PATHNAME', 'spi_insert_title_wrapper'"
    );

    let query_by_id = function_sql[2];
    assert!(query_by_id.contains("STRICT IMMUTABLE PARALLEL SAFE"));
    assert!(query_by_id.contains("RETURNS text"));

    let return_query = function_sql[5];
    assert!(return_query.contains("RETURNS TABLE(\"id\" bigint, \"title\" text)"));
    assert!(!return_query.contains("STRICT"));
    assert!(return_query.ends_with("'MODULE_PATHNAME', 'spi_return_query_wrapper'"));
}

#[test]
fn renders_setof_return_shape() {
    let manifest = ExtensionManifest::new("sets", "0.1.0").function(FunctionEntity::new(
        "all_ids",
        "all_ids_wrapper",
        ReturnShape::SetOf {
            sql_type: SqlType::BigInt,
        },
    ));
    let script = ScriptRenderer::new(Dialect::Postgres).render(&manifest).unwrap();
    let InstallStep::Sql { sql, .. } = &script.steps[0] else {
        panic!("expected SQL step");
    };
    assert!(sql.contains("RETURNS SETOF bigint"));
}

#[test]
fn sqlite_functions_become_bind_steps() {
    let script = ScriptRenderer::new(Dialect::Sqlite)
        .render(&spi_example_sqlite())
        .unwrap();

    let binds: Vec<&FunctionEntity> = script
        .steps
        .iter()
        .filter_map(|step| match step {
            InstallStep::BindFunction { function } => Some(function),
            _ => None,
        })
        .collect();
    assert_eq!(binds.len(), 6);
    assert!(binds.iter().all(|f| f.module_path == MODULE_PATHNAME));

    let text = script.sql_text();
    assert!(text.contains("-- bind function spi_insert_title to native symbol 'spi_insert_title_wrapper'"));
}

#[test]
fn validation_rejects_duplicate_tables() {
    let manifest = ExtensionManifest::new("dup", "0.1.0")
        .table(TableEntity::new("t"))
        .table(TableEntity::new("t"));
    assert!(matches!(
        validate(&manifest),
        Err(ExtpackError::Manifest(_))
    ));
}

#[test]
fn validation_rejects_seed_for_unknown_table() {
    let manifest =
        ExtensionManifest::new("orphan", "0.1.0").seed(SeedBatch::new("ghost", vec!["name"]));
    let err = validate(&manifest).unwrap_err();
    assert!(err.to_string().contains("unknown table"));
}

#[test]
fn validation_rejects_arity_mismatch() {
    let manifest = ExtensionManifest::new("arity", "0.1.0")
        .table(TableEntity::new("t").column(ColumnSpec::new("name", SqlType::Text)))
        .seed(SeedBatch::new("t", vec!["name"]).row(vec![
            SeedValue::Text("a".into()),
            SeedValue::Text("b".into()),
        ]));
    let err = validate(&manifest).unwrap_err();
    assert!(err.to_string().contains("expected 1"));
}

#[test]
fn validation_rejects_null_in_not_null_column() {
    let manifest = ExtensionManifest::new("nulls", "0.1.0")
        .table(TableEntity::new("t").column(ColumnSpec::new("name", SqlType::Text).not_null()))
        .seed(SeedBatch::new("t", vec!["name"]).row(vec![SeedValue::Null]));
    let err = validate(&manifest).unwrap_err();
    assert!(err.to_string().contains("NOT NULL"));
}

#[test]
fn validation_rejects_duplicate_symbols() {
    let shape = ReturnShape::Scalar {
        sql_type: SqlType::BigInt,
        nullable: false,
    };
    let manifest = ExtensionManifest::new("symbols", "0.1.0")
        .function(FunctionEntity::new("f1", "shared_wrapper", shape.clone()))
        .function(FunctionEntity::new("f2", "shared_wrapper", shape));
    let err = validate(&manifest).unwrap_err();
    assert!(err.to_string().contains("duplicate symbol"));
}

#[test]
fn manifest_json_round_trip() {
    let manifest = spi_example();
    let json = manifest.to_json().unwrap();
    let parsed = ExtensionManifest::from_json(&json).unwrap();

    assert_eq!(parsed.name, "spi_example");
    assert_eq!(parsed.tables.len(), 2);
    assert_eq!(parsed.functions.len(), 6);
    assert_eq!(parsed.seeds[0].rows.len(), 3);

    // Round-tripped manifests render identically
    let before = ScriptRenderer::new(Dialect::Postgres)
        .render(&manifest)
        .unwrap()
        .sql_text();
    let after = ScriptRenderer::new(Dialect::Postgres)
        .render(&parsed)
        .unwrap()
        .sql_text();
    assert_eq!(before, after);
}

#[test]
fn builtin_registry_covers_every_symbol() {
    let registry = spi_example_natives();
    for function in &spi_example().functions {
        assert!(
            registry.contains(&function.symbol),
            "missing native for {}",
            function.symbol
        );
    }
}

#[test]
fn builtin_manifest_declares_expected_seeds() {
    let manifest = spi_example();
    let seed = &manifest.seeds[0];
    assert_eq!(seed.table, "spi_example");
    assert_eq!(seed.columns, vec!["title".to_string()]);
    let titles: Vec<&SeedValue> = seed.rows.iter().map(|r| &r[0]).collect();
    assert_eq!(
        titles,
        vec![
            &SeedValue::Text("This is a test".into()),
            &SeedValue::Text("Hello There!".into()),
            &SeedValue::Text("I like pudding".into()),
        ]
    );
}
