//! Virtual filesystem over mounted ZIP archives.
//!
//! A mounted game pack is served directly out of its archive without
//! extraction; several packs may be mounted at once because several games
//! may be actively served.

mod error;
mod table;

pub use error::{MountError, Result};
pub use table::{ArchiveHit, MountInfo, MountTable, PREFIX_VARIANTS};
