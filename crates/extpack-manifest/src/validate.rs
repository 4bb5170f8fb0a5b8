//! Manifest validation

use crate::{ExtensionManifest, SeedValue};
use extpack_core::{ExtpackError, Result};
use std::collections::HashSet;

/// Validate a manifest before rendering.
///
/// Checks structural consistency: object name uniqueness, seed targets and
/// arity, and NULL literals against NOT NULL columns. Engine-level failures
/// (duplicate objects in the target catalog, type coercion) remain the host
/// engine's to report.
pub fn validate(manifest: &ExtensionManifest) -> Result<()> {
    if manifest.name.trim().is_empty() {
        return Err(ExtpackError::Manifest("extension name is empty".into()));
    }

    let mut table_names = HashSet::new();
    for table in &manifest.tables {
        if !table_names.insert(table.name.as_str()) {
            return Err(ExtpackError::Manifest(format!(
                "duplicate table '{}'",
                table.name
            )));
        }
        let mut column_names = HashSet::new();
        for column in &table.columns {
            if !column_names.insert(column.name.as_str()) {
                return Err(ExtpackError::Manifest(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, table.name
                )));
            }
        }
    }

    for seed in &manifest.seeds {
        let table = manifest.find_table(&seed.table).ok_or_else(|| {
            ExtpackError::Manifest(format!("seed targets unknown table '{}'", seed.table))
        })?;

        for column in &seed.columns {
            if !table.columns.iter().any(|c| &c.name == column) {
                return Err(ExtpackError::Manifest(format!(
                    "seed for '{}' references unknown column '{}'",
                    seed.table, column
                )));
            }
        }

        for (index, row) in seed.rows.iter().enumerate() {
            if row.len() != seed.columns.len() {
                return Err(ExtpackError::Manifest(format!(
                    "seed row {} for '{}' has {} values, expected {}",
                    index + 1,
                    seed.table,
                    row.len(),
                    seed.columns.len()
                )));
            }
            for (column, value) in seed.columns.iter().zip(row) {
                let spec = table
                    .columns
                    .iter()
                    .find(|c| &c.name == column)
                    .expect("column checked above");
                if matches!(value, SeedValue::Null)
                    && !spec.nullable
                    && !spec.sql_type.is_auto_increment()
                {
                    return Err(ExtpackError::Manifest(format!(
                        "seed row {} for '{}' puts NULL in NOT NULL column '{}'",
                        index + 1,
                        seed.table,
                        column
                    )));
                }
            }
        }
    }

    let mut function_names = HashSet::new();
    let mut symbols = HashSet::new();
    for function in &manifest.functions {
        if !function_names.insert(function.name.as_str()) {
            return Err(ExtpackError::Manifest(format!(
                "duplicate function '{}'",
                function.name
            )));
        }
        if function.symbol.trim().is_empty() {
            return Err(ExtpackError::Manifest(format!(
                "function '{}' has an empty symbol",
                function.name
            )));
        }
        if !symbols.insert(function.symbol.as_str()) {
            return Err(ExtpackError::Manifest(format!(
                "duplicate symbol '{}'",
                function.symbol
            )));
        }
    }

    Ok(())
}
