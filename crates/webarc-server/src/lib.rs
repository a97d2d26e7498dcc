//! The content-delivery frontend: request-key normalization, the local
//! path-resolution cascade, archive and external fallback tiers, CGI
//! routing, and the two HTTP surfaces that expose them.

mod cascade;
mod error;
mod external;
mod game;
mod key;
pub mod mime;
mod routes;
mod service;

pub use cascade::{Cascade, CascadeConfig};
pub use error::{Result, ServeError};
pub use external::{ExternalFetcher, ExternalHit, ExternalSource};
pub use game::GameContentService;
pub use key::{RequestKey, request_key};
pub use routes::{AppState, content_router, game_router};
pub use service::{ContentService, Resolved, Served, SourceTag};
