//! extpack - model, render, and install database extension manifests

mod logging;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use extpack_core::{ConnectionConfig, DatabaseDriver, NativeRegistry};
use extpack_drivers::DriverRegistry;
use extpack_install::{Installer, Verifier};
use extpack_manifest::{
    Dialect, ExtensionManifest, ReturnShape, ScriptRenderer, spi_example, spi_example_natives,
    spi_example_sqlite, validate,
};

#[derive(Debug, Parser)]
#[command(
    name = "extpack",
    about = "Model, render, and install database extension manifests",
    version
)]
struct Cli {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    Postgres,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

impl std::fmt::Display for DialectArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DialectArg::Postgres => "postgres",
            DialectArg::Sqlite => "sqlite",
        })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the rendered install script
    Render {
        #[arg(long, value_enum, default_value_t = DialectArg::Postgres)]
        dialect: DialectArg,
        /// Manifest JSON file (defaults to the built-in spi_example)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Validate a manifest file
    Validate {
        /// Manifest JSON file
        manifest: PathBuf,
    },
    /// Apply a manifest to a target database
    Install {
        /// SQLite database path (":memory:" for a throwaway target)
        #[arg(long, conflicts_with_all = ["host", "dbname"])]
        database: Option<String>,
        /// PostgreSQL host
        #[arg(long)]
        host: Option<String>,
        /// PostgreSQL port
        #[arg(long, default_value_t = 5432)]
        port: u16,
        /// PostgreSQL database name
        #[arg(long)]
        dbname: Option<String>,
        /// PostgreSQL user
        #[arg(long)]
        user: Option<String>,
        /// PostgreSQL password
        #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Manifest JSON file (defaults to the built-in spi_example)
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Run post-install checks
        #[arg(long)]
        verify: bool,
    },
    /// List the objects a manifest declares
    Inspect {
        /// Manifest JSON file (defaults to the built-in spi_example)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Render { dialect, manifest } => {
            let dialect = Dialect::from(dialect);
            let (manifest, _natives) = load_manifest(manifest.as_ref(), dialect)?;
            let script = ScriptRenderer::new(dialect).render(&manifest)?;
            print!("{}", script.sql_text());
        }
        Command::Validate { manifest } => {
            let parsed = read_manifest(&manifest)?;
            validate(&parsed)?;
            println!(
                "{} {} is valid: {} table(s), {} seed batch(es), {} function(s)",
                parsed.name,
                parsed.version,
                parsed.tables.len(),
                parsed.seeds.len(),
                parsed.functions.len()
            );
        }
        Command::Install {
            database,
            host,
            port,
            dbname,
            user,
            password,
            manifest,
            verify,
        } => {
            let (dialect, config) = if let Some(path) = database {
                (Dialect::Sqlite, ConnectionConfig::new_sqlite(&path))
            } else if let Some(dbname) = dbname {
                let mut config = ConnectionConfig::new("postgres", &dbname);
                config.host = host.unwrap_or_else(|| "localhost".to_string());
                config.port = port;
                config.database = Some(dbname);
                config.username = user;
                config.password = password;
                (Dialect::Postgres, config)
            } else {
                bail!("choose a target: --database <path> for SQLite or --dbname <name> for PostgreSQL");
            };

            let registry = DriverRegistry::with_defaults();
            let driver = registry
                .get(dialect.id())
                .with_context(|| format!("driver '{}' is not available", dialect))?;
            let conn = driver.connect(&config).await?;

            let (manifest, natives) = load_manifest(manifest.as_ref(), dialect)?;
            let script = ScriptRenderer::new(dialect).render(&manifest)?;
            let installation = Installer::with_registry(natives)
                .install(conn.as_ref(), &script)
                .await?;

            println!(
                "installed {} {}: {} statement(s), {} row(s) seeded, {} function(s) registered in {} ms",
                manifest.name,
                manifest.version,
                installation.report.statements_applied,
                installation.report.rows_seeded,
                installation.report.functions_registered,
                installation.report.duration_ms
            );

            if verify {
                let report = Verifier::new(dialect).verify(conn.as_ref(), &manifest).await?;
                for check in &report.checks {
                    let status = if check.passed { "ok" } else { "FAIL" };
                    println!("  [{}] {}: {}", status, check.name, check.detail);
                }
                if !report.ok() {
                    bail!("verification failed");
                }
            }
        }
        Command::Inspect { manifest } => {
            let (manifest, _natives) = load_manifest(manifest.as_ref(), Dialect::Postgres)?;
            println!("extension {} {}", manifest.name, manifest.version);
            for table in &manifest.tables {
                println!("  table {} ({} column(s))", table.name, table.columns.len());
            }
            for seed in &manifest.seeds {
                println!("  seed {} ({} row(s))", seed.table, seed.rows.len());
            }
            for function in &manifest.functions {
                let args = function
                    .args
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let shape = match &function.returns {
                    ReturnShape::Scalar { .. } => "scalar",
                    ReturnShape::SetOf { .. } => "setof",
                    ReturnShape::RowTable { .. } => "table",
                };
                println!(
                    "  function {}({}) -> {} [symbol {}]",
                    function.name, args, shape, function.symbol
                );
            }
        }
    }

    Ok(())
}

fn read_manifest(path: &PathBuf) -> anyhow::Result<ExtensionManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    Ok(ExtensionManifest::from_json(&json)?)
}

/// Resolve the manifest to work on: an explicit file, or the built-in
/// spi_example in the form the target dialect can express. File manifests
/// get an empty symbol table; their natives are the caller's to supply.
fn load_manifest(
    path: Option<&PathBuf>,
    dialect: Dialect,
) -> anyhow::Result<(ExtensionManifest, NativeRegistry)> {
    match path {
        Some(path) => Ok((read_manifest(path)?, NativeRegistry::new())),
        None => {
            let manifest = match dialect {
                Dialect::Postgres => spi_example(),
                Dialect::Sqlite => spi_example_sqlite(),
            };
            Ok((manifest, spi_example_natives()))
        }
    }
}
