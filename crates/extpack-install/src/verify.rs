//! Post-install verification
//!
//! Checks the observable properties an applied manifest guarantees: every
//! declared table exists, seed batches landed with the declared row count,
//! and sequence-assigned keys came out distinct and strictly increasing.

use extpack_core::{Connection, ExtpackError, Result, Value};
use extpack_manifest::{Dialect, ExtensionManifest, SeedValue};

/// Outcome of a single verification check
#[derive(Debug, Clone)]
pub struct VerifyCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of a verification run
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checks: Vec<VerifyCheck>,
}

impl VerifyReport {
    /// Whether every check passed
    pub fn ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// The checks that failed
    pub fn failures(&self) -> Vec<&VerifyCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    fn push(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        self.checks.push(VerifyCheck {
            name: name.into(),
            passed,
            detail: detail.into(),
        });
    }
}

/// Verifies an installed manifest against a live connection
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    dialect: Dialect,
}

impl Verifier {
    /// Create a verifier for the given dialect
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Create a verifier matching the connection's driver
    pub fn for_connection(conn: &dyn Connection) -> Result<Self> {
        Dialect::from_driver_name(conn.driver_name())
            .map(Self::new)
            .ok_or_else(|| {
                ExtpackError::Driver(format!("unknown driver '{}'", conn.driver_name()))
            })
    }

    /// Run all checks for the manifest
    #[tracing::instrument(skip(self, conn, manifest), fields(extension = %manifest.name))]
    pub async fn verify(
        &self,
        conn: &dyn Connection,
        manifest: &ExtensionManifest,
    ) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();

        for table in &manifest.tables {
            let exists = self.table_exists(conn, &table.name).await?;
            report.push(
                format!("table '{}' exists", table.name),
                exists,
                if exists { "present" } else { "missing" }.to_string(),
            );
        }

        for seed in &manifest.seeds {
            let quoted = self.dialect.quote_identifier(&seed.table);
            let count = self.scalar_i64(conn, &format!("SELECT count(*) FROM {}", quoted)).await?;
            let expected = seed.rows.len() as i64;
            report.push(
                format!("'{}' row count", seed.table),
                count == expected,
                format!("{} rows, expected {}", count, expected),
            );

            if let Some(table) = manifest.find_table(&seed.table) {
                if let Some(pk) = table.serial_primary_key() {
                    let ids = self
                        .column_i64(
                            conn,
                            &format!(
                                "SELECT {} FROM {} ORDER BY {}",
                                self.dialect.quote_identifier(&pk.name),
                                quoted,
                                self.dialect.quote_identifier(&pk.name)
                            ),
                        )
                        .await?;
                    let increasing = ids.windows(2).all(|pair| pair[0] < pair[1]);
                    report.push(
                        format!("'{}' ids strictly increasing", seed.table),
                        increasing,
                        format!("{:?}", ids),
                    );
                }
            }

            self.check_seed_values(conn, manifest, seed, &mut report).await?;
        }

        Ok(report)
    }

    /// Compare the seeded literal values of each text column against what
    /// the table now holds, as multisets.
    async fn check_seed_values(
        &self,
        conn: &dyn Connection,
        manifest: &ExtensionManifest,
        seed: &extpack_manifest::SeedBatch,
        report: &mut VerifyReport,
    ) -> Result<()> {
        let Some(_table) = manifest.find_table(&seed.table) else {
            return Ok(());
        };

        for (index, column) in seed.columns.iter().enumerate() {
            let mut expected: Vec<String> = seed
                .rows
                .iter()
                .filter_map(|row| match &row[index] {
                    SeedValue::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            if expected.is_empty() {
                continue;
            }
            expected.sort();

            let result = conn
                .query(
                    &format!(
                        "SELECT {} FROM {} ORDER BY {}",
                        self.dialect.quote_identifier(column),
                        self.dialect.quote_identifier(&seed.table),
                        self.dialect.quote_identifier(column)
                    ),
                    &[],
                )
                .await?;
            let mut actual: Vec<String> = result
                .rows
                .iter()
                .filter_map(|row| row.get(0).and_then(|v| v.as_str()).map(String::from))
                .collect();
            actual.sort();

            report.push(
                format!("'{}' seeded values in '{}'", column, seed.table),
                actual == expected,
                format!("{:?}", actual),
            );
        }
        Ok(())
    }

    async fn table_exists(&self, conn: &dyn Connection, name: &str) -> Result<bool> {
        let escaped = self.dialect.escape_literal(name);
        let sql = match self.dialect {
            Dialect::Sqlite => format!(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '{}'",
                escaped
            ),
            Dialect::Postgres => format!(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = '{}'",
                escaped
            ),
        };
        Ok(conn.query(&sql, &[]).await?.has_rows())
    }

    async fn scalar_i64(&self, conn: &dyn Connection, sql: &str) -> Result<i64> {
        conn.query(sql, &[])
            .await?
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .ok_or_else(|| ExtpackError::Statement(format!("no scalar result for: {}", sql)))
    }

    async fn column_i64(&self, conn: &dyn Connection, sql: &str) -> Result<Vec<i64>> {
        Ok(conn
            .query(sql, &[])
            .await?
            .rows
            .iter()
            .filter_map(|row| row.get(0).and_then(Value::as_i64))
            .collect())
    }
}
