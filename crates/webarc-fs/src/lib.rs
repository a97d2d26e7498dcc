//! Cross-platform filesystem primitives for the archive server.
//!
//! Path handling here is lexical and traversal-safe: every stored or
//! requested relative path goes through [`safe_join`] before it is allowed
//! to touch disk.

mod error;
mod paths;
mod place;

pub use error::{FsError, Result};
pub use paths::{normalize, safe_join, to_portable};
pub use place::place_file;
