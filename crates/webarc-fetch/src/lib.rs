//! On-demand asset downloading with streaming verification and atomic
//! import.
//!
//! The orchestrator walks an ordered source list, stages bytes to a temp
//! file while hashing them, and only a verified file is moved into the
//! content directory and recorded. The registry gives every subsystem the
//! same view of in-flight downloads and prevents duplicate attempts.

mod cancel;
mod error;
mod http;
mod orchestrator;
mod registry;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use error::{FetchError, Result, SourceFailure};
pub use http::{BodyStream, BoxStream, HttpClient, ReqwestClient};
pub use orchestrator::{DownloadOptions, DownloadOrchestrator, DownloadProgress, ProgressFn};
pub use registry::{
    AlreadyDownloading, DownloadEntry, DownloadOrigin, DownloadRegistry, DownloadStatus,
};
