//! Database module for vigil.
//!
//! Provides SQLite storage for targets, nodes, their history series and the
//! notifier settings.

mod models;
mod store;

pub use models::*;
pub use store::*;
