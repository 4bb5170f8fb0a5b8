//! Extpack Install - transactional application of install scripts
//!
//! The installer feeds a rendered script to a database connection,
//! statement by statement, inside one transaction. There is no retry and
//! no partial-success handling: the first failing statement aborts the
//! install and the transaction rolls back. Function registrations that the
//! engine cannot express as SQL are bound in-process after the transaction
//! commits, against a symbol table resolved before anything executes.

mod installer;
mod router;
mod verify;

pub use installer::*;
pub use router::*;
pub use verify::*;
