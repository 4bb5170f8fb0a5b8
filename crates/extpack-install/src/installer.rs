//! Install script application

use crate::FunctionRouter;
use extpack_core::{Connection, ExtpackError, NativeRegistry, Result};
use extpack_manifest::{InstallScript, InstallStep, StepKind};
use std::time::Instant;

/// Result of a completed install
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// SQL statements applied inside the transaction
    pub statements_applied: usize,
    /// Rows inserted by seed statements
    pub rows_seeded: u64,
    /// Function registrations applied (SQL or in-process)
    pub functions_registered: usize,
    /// Wall-clock duration of the install
    pub duration_ms: u64,
}

/// A completed installation: the report plus the dispatch table for any
/// in-process bindings the script carried
#[derive(Debug)]
pub struct Installation {
    pub report: InstallReport,
    pub functions: FunctionRouter,
}

/// Applies install scripts over a connection
#[derive(Debug, Default)]
pub struct Installer {
    registry: NativeRegistry,
}

impl Installer {
    /// Create an installer with an empty symbol table.
    ///
    /// Sufficient for scripts whose function registrations are all SQL
    /// statements (the engine links symbols itself).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an installer backed by a native symbol table
    pub fn with_registry(registry: NativeRegistry) -> Self {
        Self { registry }
    }

    /// Apply a script: every SQL step in order inside one transaction,
    /// then in-process bindings.
    ///
    /// Symbols for binding steps are resolved before the transaction
    /// starts, so an unlinkable script touches nothing. The first failing
    /// statement aborts the install; the transaction rolls back and the
    /// error is annotated with the statement position and object name.
    #[tracing::instrument(skip(self, conn, script), fields(dialect = %script.dialect, steps = script.steps.len()))]
    pub async fn install(
        &self,
        conn: &dyn Connection,
        script: &InstallScript,
    ) -> Result<Installation> {
        let started = Instant::now();
        let mut report = InstallReport::default();
        let mut router = FunctionRouter::new();

        // Link check first: binding steps must resolve against the symbol
        // table before any statement executes.
        let mut bindings = Vec::new();
        for step in &script.steps {
            if let InstallStep::BindFunction { function } = step {
                let native = self.registry.resolve(&function.symbol).ok_or_else(|| {
                    ExtpackError::UndefinedSymbol(format!(
                        "'{}' required by function '{}'",
                        function.symbol, function.name
                    ))
                })?;
                bindings.push((function.clone(), native));
            }
        }

        let tx = conn.begin_transaction().await?;
        for (index, step) in script.steps.iter().enumerate() {
            let InstallStep::Sql { kind, object, sql } = step else {
                continue;
            };
            tracing::debug!(statement = index + 1, object = %object, "applying statement");
            let result = match tx.execute(sql, &[]).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(statement = index + 1, object = %object, error = %err, "install aborted");
                    tx.rollback().await?;
                    return Err(annotate(err, index + 1, object));
                }
            };

            report.statements_applied += 1;
            match kind {
                StepKind::SeedRows => report.rows_seeded += result.affected_rows,
                StepKind::CreateFunction => report.functions_registered += 1,
                StepKind::CreateTable => {}
            }
        }
        tx.commit().await?;

        for (function, native) in bindings {
            router.bind(function, native)?;
            report.functions_registered += 1;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            statements = report.statements_applied,
            rows_seeded = report.rows_seeded,
            functions = report.functions_registered,
            duration_ms = report.duration_ms,
            "install complete"
        );

        Ok(Installation {
            report,
            functions: router,
        })
    }
}

/// Keep duplicate-object errors recognizable; wrap everything else with
/// the failing statement's position.
fn annotate(err: ExtpackError, position: usize, object: &str) -> ExtpackError {
    match err {
        ExtpackError::DuplicateObject(_) => err,
        other => ExtpackError::Statement(format!(
            "statement {} ({}) failed: {}",
            position, object, other
        )),
    }
}
