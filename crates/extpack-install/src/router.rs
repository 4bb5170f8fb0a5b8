//! Function dispatch for in-process bindings

use extpack_core::{
    CallOutcome, Connection, ExtpackError, NativeFn, QueryResult, Result, Value,
};
use extpack_manifest::FunctionEntity;
use std::collections::HashMap;

struct RouterEntry {
    function: FunctionEntity,
    native: NativeFn,
}

/// Dispatch table for function registrations bound in-process.
///
/// On engines without SQL-level function registration the installer
/// materializes each registration here: declared signature plus the
/// resolved native. Calls go through the declared contract: arity is
/// checked and STRICT short-circuits before the native runs.
#[derive(Default)]
pub struct FunctionRouter {
    entries: HashMap<String, RouterEntry>,
}

impl FunctionRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a registration to its resolved native implementation.
    ///
    /// Binding a name that is already registered is a duplicate-object
    /// error, matching what an engine catalog would report.
    pub fn bind(&mut self, function: FunctionEntity, native: NativeFn) -> Result<()> {
        if self.entries.contains_key(&function.name) {
            return Err(ExtpackError::DuplicateObject(format!(
                "function '{}'",
                function.name
            )));
        }
        tracing::debug!(function = %function.name, symbol = %function.symbol, "binding function");
        self.entries
            .insert(function.name.clone(), RouterEntry { function, native });
        Ok(())
    }

    /// Invoke a bound function by its SQL name.
    ///
    /// STRICT registrations return NULL (or no rows, for set-returning
    /// shapes) on any NULL argument without invoking the native code.
    pub async fn call(
        &self,
        conn: &dyn Connection,
        name: &str,
        args: &[Value],
    ) -> Result<CallOutcome> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ExtpackError::NotFound(format!("function '{}'", name)))?;

        let declared = entry.function.args.len();
        if args.len() != declared {
            return Err(ExtpackError::Statement(format!(
                "function '{}' takes {} argument(s), {} given",
                name,
                declared,
                args.len()
            )));
        }

        if entry.function.strict && args.iter().any(Value::is_null) {
            tracing::trace!(function = %name, "strict null short-circuit");
            return Ok(if entry.function.returns.is_set_returning() {
                CallOutcome::Rows(QueryResult::empty())
            } else {
                CallOutcome::Scalar(Value::Null)
            });
        }

        (entry.native)(conn, args.to_vec()).await
    }

    /// Check whether a function name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all bound functions
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of bound functions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no functions are bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for FunctionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRouter")
            .field("functions", &self.names())
            .finish()
    }
}
