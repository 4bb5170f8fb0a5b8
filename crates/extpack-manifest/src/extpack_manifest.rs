//! Extpack Manifest - typed extension manifests and SQL rendering
//!
//! An extension install script declares a schema surface: tables, seed
//! rows, and function registrations bound to external native symbols. This
//! crate models that script as data (`ExtensionManifest`), validates it,
//! and renders it to an ordered statement list (`InstallScript`) for a
//! target dialect. Rendering emits no idempotency guards: re-applying a
//! script against an existing installation is expected to fail with a
//! duplicate-object error from the engine.

mod builtin;
mod dialect;
mod entity;
mod render;
mod validate;

#[cfg(test)]
mod tests;

pub use builtin::*;
pub use dialect::*;
pub use entity::*;
pub use render::*;
pub use validate::*;
