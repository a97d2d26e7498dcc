//! CGI/1.1 bridge for legacy server-side scripts.
//!
//! Spawns one interpreter process per request with a synthesized,
//! allow-listed environment. The protocol rules here reproduce the
//! hardening the legacy proxy carried for php-cgi: symlink-resolved root
//! confinement, explicit-argument invocation, and a query-string filter
//! that drops flag-shaped segments before they can be read as CLI options.

mod env;
mod error;
mod executor;
mod request;
mod response;

pub use env::{FORWARDED_HEADERS, INHERITED_ENV, filter_query};
pub use error::{CgiError, Result};
pub use executor::{CgiConfig, CgiExecutor};
pub use request::CgiRequest;
pub use response::{CgiResponse, DEFAULT_CONTENT_TYPE, parse_output};
