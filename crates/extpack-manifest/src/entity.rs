//! Manifest entities
//!
//! Each entity corresponds to one statement of the rendered install script.
//! Function entities are registration records only: a signature plus the
//! external symbol that provides the implementation.

use serde::{Deserialize, Serialize};

/// SQL type used for columns, arguments, and return values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// 64-bit auto-incrementing integer backed by a sequence
    BigSerial,
    BigInt,
    Integer,
    Text,
    Boolean,
    DoublePrecision,
    Bytes,
}

impl SqlType {
    /// Whether values of this type are assigned by the engine's sequence
    pub fn is_auto_increment(&self) -> bool {
        matches!(self, SqlType::BigSerial)
    }
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Table entity.
///
/// Zero columns is legal: install scripts may declare a columnless
/// placeholder table. Whether a dialect can express that is a rendering
/// concern, not a modeling one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntity {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl TableEntity {
    /// Create a table with no columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// The auto-increment primary key column, if the table has one
    pub fn serial_primary_key(&self) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.primary_key && c.sql_type.is_auto_increment())
    }
}

/// A literal value in a seed row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SeedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SeedValue::Null)
    }
}

/// One INSERT statement seeding a table with literal rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedBatch {
    /// Target table name
    pub table: String,
    /// Columns the literals are supplied for
    pub columns: Vec<String>,
    /// Row tuples, one per seeded row
    pub rows: Vec<Vec<SeedValue>>,
}

impl SeedBatch {
    pub fn new(table: impl Into<String>, columns: Vec<&str>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(String::from).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row tuple
    pub fn row(mut self, values: Vec<SeedValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Append a single-column text row
    pub fn text_row(self, value: impl Into<String>) -> Self {
        self.row(vec![SeedValue::Text(value.into())])
    }
}

/// Function argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub sql_type: SqlType,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Declared return shape of a registered function
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    /// A single value; `nullable` means the function may return NULL
    Scalar { sql_type: SqlType, nullable: bool },
    /// A set of values of one type
    SetOf { sql_type: SqlType },
    /// A named row-typed table
    RowTable { columns: Vec<ArgSpec> },
}

impl ReturnShape {
    /// Whether the function returns rows rather than one value
    pub fn is_set_returning(&self) -> bool {
        !matches!(self, ReturnShape::Scalar { .. })
    }
}

/// Function volatility hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    #[default]
    Volatile,
    Stable,
    Immutable,
}

/// Parallel-safety hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parallel {
    #[default]
    Unsafe,
    Restricted,
    Safe,
}

/// Module placeholder the host engine resolves to the shared module path
pub const MODULE_PATHNAME: &str = "MODULE_PATHNAME";

fn default_module_path() -> String {
    MODULE_PATHNAME.to_string()
}

/// A function registration record.
///
/// This is signature plus symbol reference; no executable logic lives in
/// the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    /// SQL-callable name
    pub name: String,
    /// Positional parameters
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    /// Declared return shape
    pub returns: ReturnShape,
    /// STRICT: any NULL input yields NULL/no rows without invoking the
    /// native code
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub volatility: Volatility,
    #[serde(default)]
    pub parallel: Parallel,
    /// External symbol providing the implementation
    pub symbol: String,
    /// Shared module reference, usually the `MODULE_PATHNAME` placeholder
    #[serde(default = "default_module_path")]
    pub module_path: String,
}

impl FunctionEntity {
    /// Create a registration returning a non-null scalar
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, returns: ReturnShape) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns,
            strict: false,
            volatility: Volatility::Volatile,
            parallel: Parallel::Unsafe,
            symbol: symbol.into(),
            module_path: default_module_path(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, name: impl Into<String>, sql_type: SqlType) -> Self {
        self.args.push(ArgSpec::new(name, sql_type));
        self
    }

    /// Mark the registration STRICT
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Mark the registration IMMUTABLE
    pub fn immutable(mut self) -> Self {
        self.volatility = Volatility::Immutable;
        self
    }

    /// Mark the registration PARALLEL SAFE
    pub fn parallel_safe(mut self) -> Self {
        self.parallel = Parallel::Safe;
        self
    }
}

/// A complete extension manifest: the typed form of one install script.
///
/// Entity order is declaration order and is preserved by rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Extension name
    pub name: String,
    /// Extension version
    pub version: String,
    #[serde(default)]
    pub tables: Vec<TableEntity>,
    #[serde(default)]
    pub seeds: Vec<SeedBatch>,
    #[serde(default)]
    pub functions: Vec<FunctionEntity>,
}

impl ExtensionManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tables: Vec::new(),
            seeds: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn table(mut self, table: TableEntity) -> Self {
        self.tables.push(table);
        self
    }

    pub fn seed(mut self, seed: SeedBatch) -> Self {
        self.seeds.push(seed);
        self
    }

    pub fn function(mut self, function: FunctionEntity) -> Self {
        self.functions.push(function);
        self
    }

    /// Look up a table by name
    pub fn find_table(&self, name: &str) -> Option<&TableEntity> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Parse a manifest from JSON
    pub fn from_json(json: &str) -> extpack_core::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the manifest to pretty-printed JSON
    pub fn to_json(&self) -> extpack_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
