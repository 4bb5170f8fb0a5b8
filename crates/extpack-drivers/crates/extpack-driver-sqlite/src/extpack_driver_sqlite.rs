//! SQLite driver for extpack
//!
//! SQLite serves as the in-process install target: tables and seeds apply
//! as SQL, while function registrations are bound through the installer's
//! dispatch layer rather than engine DDL.

mod connection;
mod driver;

pub use connection::{SqliteConnection, SqliteTransaction};
pub use driver::SqliteDriver;
