//! SQL dialects for script rendering

use crate::{SeedValue, SqlType};
use serde::{Deserialize, Serialize};

/// SQL dialect a script is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// PostgreSQL: the native host for extension install scripts
    #[default]
    Postgres,
    /// SQLite: in-process engine; function registrations are bound natively
    Sqlite,
}

impl Dialect {
    /// Stable identifier matching the driver name
    pub fn id(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Resolve a dialect from a driver name
    pub fn from_driver_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// Returns the identifier quote character for this dialect
    pub fn quote_char(&self) -> char {
        match self {
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// Quotes an identifier
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = self.quote_char();
        format!("{}{}{}", quote, name, quote)
    }

    /// Escape a string for inclusion as a SQL literal (without quotes)
    pub fn escape_literal(&self, text: &str) -> String {
        text.replace('\'', "''")
    }

    /// Render a seed value as a SQL literal
    pub fn literal(&self, value: &SeedValue) -> String {
        match value {
            SeedValue::Null => "NULL".to_string(),
            SeedValue::Bool(b) => match self {
                Dialect::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
                Dialect::Sqlite => if *b { "1" } else { "0" }.to_string(),
            },
            SeedValue::Int(i) => i.to_string(),
            SeedValue::Float(f) => f.to_string(),
            SeedValue::Text(s) => format!("'{}'", self.escape_literal(s)),
        }
    }

    /// Type name for a column or argument of the given SQL type
    pub fn type_name(&self, sql_type: SqlType) -> &'static str {
        match self {
            Dialect::Postgres => match sql_type {
                SqlType::BigSerial => "bigserial",
                SqlType::BigInt => "bigint",
                SqlType::Integer => "integer",
                SqlType::Text => "text",
                SqlType::Boolean => "boolean",
                SqlType::DoublePrecision => "double precision",
                SqlType::Bytes => "bytea",
            },
            Dialect::Sqlite => match sql_type {
                // bigserial maps to INTEGER PRIMARY KEY AUTOINCREMENT; the
                // AUTOINCREMENT part is emitted by column rendering
                SqlType::BigSerial | SqlType::BigInt | SqlType::Integer => "INTEGER",
                SqlType::Text => "TEXT",
                SqlType::Boolean => "INTEGER",
                SqlType::DoublePrecision => "REAL",
                SqlType::Bytes => "BLOB",
            },
        }
    }

    /// Returns whether this dialect can declare a table with no columns
    pub fn supports_zero_column_tables(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Returns whether function registrations are expressible as SQL
    /// (CREATE FUNCTION bound to an external symbol)
    pub fn supports_sql_function_registration(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
