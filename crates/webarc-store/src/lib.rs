//! Persistent download-state records.
//!
//! The core reads and writes only a handful of fields: which content
//! package a game's active pointer designates, whether its bytes are on
//! disk, and where. Everything else about the catalog belongs to the
//! surrounding subsystems.

mod error;
mod records;

pub use error::{Result, StoreError};
pub use records::{GameDataRecord, GameDataStore};
