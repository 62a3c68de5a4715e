//! Client library for the EPICS Save-and-Restore service.
//!
//! Public API layers:
//! - [`SaveRestoreClient`]/[`BlockingSaveRestoreClient`]: the async and
//!   blocking personalities of the same operation set.
//! - [`ops`]: pure request preparation, one function per remote operation.
//! - [`Payload`]/[`ClientError`]: the uniform success and failure surface.
//!
//! Both personalities delegate request preparation, auth resolution and
//! response classification to shared modules; they differ only in how the
//! I/O is awaited, so a blocking and an async program observe identical
//! behavior for the same operation.

use std::time::Duration;

mod auth;
mod blocking_client;
mod client;
mod error;
pub mod ops;
mod response;

/// Default per-request timeout used when a client does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential for per-call or session-wide HTTP Basic authentication.
pub use auth::Credential;
/// Blocking personality of the client.
pub use blocking_client::BlockingSaveRestoreClient;
/// Async personality of the client.
pub use client::SaveRestoreClient;
/// Error type returned by all client operations.
pub use error::ClientError;
/// Transport-agnostic request description consumed by `send_request`.
pub use ops::{PreparedRequest, ROOT_NODE_UID};
/// Decoded response body with an explicit no-content sentinel.
pub use response::Payload;
