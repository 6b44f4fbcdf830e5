//! Server API abstraction.
//!
//! This module provides a pluggable API layer over the sync server's
//! JSON endpoints (HTTP for production, mock for testing).
//!
//! # Design
//!
//! The trait mirrors the server's endpoints one-to-one:
//! - `full_sync()` pushes queued changes and pulls server changes in one call
//! - `push()` / `pull()` are the two halves, independently addressable
//! - `status()` reports the server's view of this account
//! - `export()` / `import()` move whole-account snapshots
//!
//! # Example
//!
//! ```ignore
//! let api = MockSyncApi::new();
//! api.queue_full_sync(Ok(response));
//! let result = api.full_sync(&request).await?;
//! ```

mod http;
mod mock;

pub use http::HttpSyncApi;
pub use mock::MockSyncApi;

use async_trait::async_trait;
use thiserror::Error;

use sync_types::{
    ExportPayload, FullSyncRequest, FullSyncResponse, ImportRequest, ImportResponse, PullRequest,
    PullResponse, PushRequest, PushResponse, ServerStatus,
};

use crate::auth::AuthError;

/// API errors.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The session expired and could not be refreshed.
    #[error("session expired")]
    SessionExpired,

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Credentials were unavailable.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

/// API trait for talking to the sync server.
///
/// Implementations attach credentials and the device id to every request.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Push queued changes and pull server changes in a single round trip.
    async fn full_sync(&self, request: &FullSyncRequest) -> Result<FullSyncResponse, ApiError>;

    /// Push queued changes without pulling.
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, ApiError>;

    /// Pull changes modified since the given watermark.
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse, ApiError>;

    /// Fetch the server's view of this account's sync state.
    async fn status(&self) -> Result<ServerStatus, ApiError>;

    /// Download a whole-account snapshot.
    async fn export(&self) -> Result<ExportPayload, ApiError>;

    /// Upload a whole-account snapshot.
    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse, ApiError>;
}
