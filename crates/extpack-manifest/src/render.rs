//! Script rendering
//!
//! Renders a manifest to an ordered statement list. Order is fixed:
//! tables in declaration order, then seed batches, then function
//! registrations. No IF NOT EXISTS / OR REPLACE guards are emitted.

use crate::{
    ColumnSpec, Dialect, ExtensionManifest, FunctionEntity, ReturnShape, SeedBatch, SqlType,
    TableEntity, Volatility, Parallel, validate,
};
use extpack_core::{ExtpackError, Result};

/// Statement class of a rendered step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    CreateTable,
    SeedRows,
    CreateFunction,
}

/// One step of an install script
#[derive(Debug, Clone)]
pub enum InstallStep {
    /// A SQL statement to execute against the target database
    Sql {
        kind: StepKind,
        /// Name of the object the statement creates or populates
        object: String,
        sql: String,
    },
    /// A function registration the target engine binds in-process instead
    /// of via SQL
    BindFunction { function: FunctionEntity },
}

impl InstallStep {
    /// The name of the object this step concerns
    pub fn object(&self) -> &str {
        match self {
            InstallStep::Sql { object, .. } => object,
            InstallStep::BindFunction { function } => &function.name,
        }
    }
}

/// A rendered install script: ordered steps for one dialect
#[derive(Debug, Clone)]
pub struct InstallScript {
    pub dialect: Dialect,
    pub steps: Vec<InstallStep>,
}

impl InstallScript {
    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the script is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The script as SQL text. Binding steps have no SQL form and are
    /// rendered as comments documenting the symbol they resolve.
    pub fn sql_text(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match step {
                InstallStep::Sql { sql, .. } => {
                    out.push_str(sql);
                    out.push_str(";\n");
                }
                InstallStep::BindFunction { function } => {
                    out.push_str(&format!(
                        "-- bind function {} to native symbol '{}'\n",
                        function.name, function.symbol
                    ));
                }
            }
        }
        out
    }
}

/// Renderer from manifest to install script
#[derive(Debug, Clone, Copy)]
pub struct ScriptRenderer {
    dialect: Dialect,
}

impl ScriptRenderer {
    /// Create a renderer for the given dialect
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The target dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Render a manifest into an ordered install script.
    ///
    /// The manifest is validated first; rendering fails before emitting any
    /// step if an entity cannot be expressed on the target dialect.
    pub fn render(&self, manifest: &ExtensionManifest) -> Result<InstallScript> {
        validate(manifest)?;
        tracing::debug!(
            extension = %manifest.name,
            dialect = %self.dialect,
            tables = manifest.tables.len(),
            seeds = manifest.seeds.len(),
            functions = manifest.functions.len(),
            "rendering install script"
        );

        let mut steps = Vec::new();

        for table in &manifest.tables {
            steps.push(InstallStep::Sql {
                kind: StepKind::CreateTable,
                object: table.name.clone(),
                sql: self.create_table(table)?,
            });
        }

        for seed in &manifest.seeds {
            steps.push(InstallStep::Sql {
                kind: StepKind::SeedRows,
                object: seed.table.clone(),
                sql: self.insert_rows(seed),
            });
        }

        for function in &manifest.functions {
            if self.dialect.supports_sql_function_registration() {
                steps.push(InstallStep::Sql {
                    kind: StepKind::CreateFunction,
                    object: function.name.clone(),
                    sql: self.create_function(function),
                });
            } else {
                steps.push(InstallStep::BindFunction {
                    function: function.clone(),
                });
            }
        }

        Ok(InstallScript {
            dialect: self.dialect,
            steps,
        })
    }

    /// Generate a CREATE TABLE statement
    fn create_table(&self, table: &TableEntity) -> Result<String> {
        if table.columns.is_empty() {
            if !self.dialect.supports_zero_column_tables() {
                return Err(ExtpackError::NotSupported(format!(
                    "table '{}' has no columns, which {} cannot express",
                    table.name, self.dialect
                )));
            }
            return Ok(format!(
                "CREATE TABLE {} ()",
                self.dialect.quote_identifier(&table.name)
            ));
        }

        let column_defs: Vec<String> = table
            .columns
            .iter()
            .map(|col| self.column_definition(col))
            .collect();

        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            self.dialect.quote_identifier(&table.name),
            column_defs.join(",\n")
        ))
    }

    /// Generate a column definition
    fn column_definition(&self, column: &ColumnSpec) -> String {
        let name = self.dialect.quote_identifier(&column.name);

        // SQLite spells an auto-increment key as INTEGER PRIMARY KEY
        // AUTOINCREMENT; every other combination follows the common form.
        if self.dialect == Dialect::Sqlite
            && column.sql_type == SqlType::BigSerial
            && column.primary_key
        {
            return format!("  {} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", name);
        }

        let mut def = format!("  {} {}", name, self.dialect.type_name(column.sql_type));
        if !column.nullable || column.sql_type.is_auto_increment() {
            def.push_str(" NOT NULL");
        }
        if column.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        def
    }

    /// Generate one INSERT statement for a seed batch
    fn insert_rows(&self, seed: &SeedBatch) -> String {
        let columns = seed
            .columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let tuples = seed
            .rows
            .iter()
            .map(|row| {
                let literals = row
                    .iter()
                    .map(|v| self.dialect.literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", literals)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.dialect.quote_identifier(&seed.table),
            columns,
            tuples
        )
    }

    /// Generate a CREATE FUNCTION registration statement
    fn create_function(&self, function: &FunctionEntity) -> String {
        let args = function
            .args
            .iter()
            .map(|arg| {
                format!(
                    "{} {}",
                    self.dialect.quote_identifier(&arg.name),
                    self.dialect.type_name(arg.sql_type)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let returns = match &function.returns {
            ReturnShape::Scalar { sql_type, .. } => self.dialect.type_name(*sql_type).to_string(),
            ReturnShape::SetOf { sql_type } => {
                format!("SETOF {}", self.dialect.type_name(*sql_type))
            }
            ReturnShape::RowTable { columns } => {
                let cols = columns
                    .iter()
                    .map(|c| {
                        format!(
                            "{} {}",
                            self.dialect.quote_identifier(&c.name),
                            self.dialect.type_name(c.sql_type)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("TABLE({})", cols)
            }
        };

        let mut clauses = Vec::new();
        if function.strict {
            clauses.push("STRICT".to_string());
        }
        match function.volatility {
            Volatility::Volatile => {}
            Volatility::Stable => clauses.push("STABLE".to_string()),
            Volatility::Immutable => clauses.push("IMMUTABLE".to_string()),
        }
        match function.parallel {
            Parallel::Unsafe => {}
            Parallel::Restricted => clauses.push("PARALLEL RESTRICTED".to_string()),
            Parallel::Safe => clauses.push("PARALLEL SAFE".to_string()),
        }
        let clause_text = if clauses.is_empty() {
            String::new()
        } else {
            format!(" {}", clauses.join(" "))
        };

        format!(
            "CREATE FUNCTION {}({}) RETURNS {}{} LANGUAGE c AS '{}', '{}'",
            self.dialect.quote_identifier(&function.name),
            args,
            returns,
            clause_text,
            function.module_path,
            function.symbol
        )
    }
}
