//! Native function symbol table
//!
//! A function registration in an install script is a record, not code: a
//! SQL-callable name, a typed signature, and the name of an external symbol
//! that provides the implementation. This module carries the symbol side of
//! that record. Engines that link symbols themselves (PostgreSQL) never
//! consult it; engines that bind registrations in-process resolve each
//! symbol here at install time.

use crate::{Connection, QueryResult, Result, Value};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of invoking a bound function
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// A single (possibly NULL) scalar value
    Scalar(Value),
    /// A row set
    Rows(QueryResult),
}

impl CallOutcome {
    /// Get the scalar value, if this outcome is one
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            CallOutcome::Scalar(v) => Some(v),
            CallOutcome::Rows(_) => None,
        }
    }

    /// Get the row set, if this outcome is one
    pub fn as_rows(&self) -> Option<&QueryResult> {
        match self {
            CallOutcome::Rows(r) => Some(r),
            CallOutcome::Scalar(_) => None,
        }
    }
}

/// A native function implementation.
///
/// Natives receive the connection the extension was installed on, so they
/// can query back into the database the way server-side implementations do.
pub type NativeFn = Arc<
    dyn for<'a> Fn(&'a dyn Connection, Vec<Value>) -> BoxFuture<'a, Result<CallOutcome>>
        + Send
        + Sync,
>;

/// Symbol table mapping external symbol names to native implementations
#[derive(Default, Clone)]
pub struct NativeRegistry {
    symbols: HashMap<String, NativeFn>,
}

impl NativeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native implementation under a symbol name.
    ///
    /// Registering the same symbol twice replaces the previous entry, the
    /// same way relinking a shared module replaces its exports.
    pub fn register(&mut self, symbol: impl Into<String>, f: NativeFn) {
        let symbol = symbol.into();
        tracing::debug!(symbol = %symbol, "registering native symbol");
        self.symbols.insert(symbol, f);
    }

    /// Register a closure as a native implementation
    pub fn register_fn<F>(&mut self, symbol: impl Into<String>, f: F)
    where
        F: for<'a> Fn(&'a dyn Connection, Vec<Value>) -> BoxFuture<'a, Result<CallOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.register(symbol, Arc::new(f));
    }

    /// Resolve a symbol to its implementation
    pub fn resolve(&self, symbol: &str) -> Option<NativeFn> {
        self.symbols.get(symbol).cloned()
    }

    /// Check whether a symbol is registered
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("symbols", &self.symbols.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_registered_symbols() {
        let mut registry = NativeRegistry::new();
        assert!(registry.is_empty());

        registry.register_fn("answer_wrapper", |_conn: &dyn Connection, _args: Vec<Value>| {
            Box::pin(async { Ok(CallOutcome::Scalar(Value::Int64(42))) })
        });

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("answer_wrapper"));
        assert!(registry.resolve("answer_wrapper").is_some());
        assert!(registry.resolve("missing_wrapper").is_none());
    }

    #[test]
    fn re_registering_replaces_the_symbol() {
        let mut registry = NativeRegistry::new();
        registry.register_fn("sym", |_conn: &dyn Connection, _args: Vec<Value>| {
            Box::pin(async { Ok(CallOutcome::Scalar(Value::Int64(1))) })
        });
        registry.register_fn("sym", |_conn: &dyn Connection, _args: Vec<Value>| {
            Box::pin(async { Ok(CallOutcome::Scalar(Value::Int64(2))) })
        });
        assert_eq!(registry.len(), 1);
    }
}
