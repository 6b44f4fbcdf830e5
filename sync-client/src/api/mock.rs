//! Mock server API for testing.
//!
//! Allows queueing responses per endpoint and capturing requests
//! for verification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sync_types::{
    ExportPayload, FullSyncRequest, FullSyncResponse, ImportRequest, ImportResponse, PullRequest,
    PullResponse, PushRequest, PushResponse, ServerStatus,
};

use super::{ApiError, SyncApi};

/// Mock server API for testing.
///
/// Each endpoint pops from its own response queue. An empty queue answers
/// with the sticky default (if set for that endpoint) or a network error,
/// so a test that forgets to queue a response fails loudly rather than
/// hanging. Clones share state.
#[derive(Debug, Default)]
pub struct MockSyncApi {
    inner: Arc<Mutex<MockSyncApiInner>>,
}

#[derive(Debug, Default)]
struct MockSyncApiInner {
    full_sync_queue: VecDeque<Result<FullSyncResponse, ApiError>>,
    push_queue: VecDeque<Result<PushResponse, ApiError>>,
    pull_queue: VecDeque<Result<PullResponse, ApiError>>,
    status_queue: VecDeque<Result<ServerStatus, ApiError>>,
    export_queue: VecDeque<Result<ExportPayload, ApiError>>,
    import_queue: VecDeque<Result<ImportResponse, ApiError>>,
    full_sync_requests: Vec<FullSyncRequest>,
    push_requests: Vec<PushRequest>,
    pull_requests: Vec<PullRequest>,
    import_requests: Vec<ImportRequest>,
    status_calls: usize,
    export_calls: usize,
    default_full_sync: Option<FullSyncResponse>,
    response_delay: Option<Duration>,
}

impl MockSyncApi {
    /// Create a new mock API with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next `full_sync()` call.
    pub fn queue_full_sync(&self, response: Result<FullSyncResponse, ApiError>) {
        self.inner
            .lock()
            .unwrap()
            .full_sync_queue
            .push_back(response);
    }

    /// Queue a response for the next `push()` call.
    pub fn queue_push(&self, response: Result<PushResponse, ApiError>) {
        self.inner.lock().unwrap().push_queue.push_back(response);
    }

    /// Queue a response for the next `pull()` call.
    pub fn queue_pull(&self, response: Result<PullResponse, ApiError>) {
        self.inner.lock().unwrap().pull_queue.push_back(response);
    }

    /// Queue a response for the next `status()` call.
    pub fn queue_status(&self, response: Result<ServerStatus, ApiError>) {
        self.inner.lock().unwrap().status_queue.push_back(response);
    }

    /// Queue a response for the next `export()` call.
    pub fn queue_export(&self, response: Result<ExportPayload, ApiError>) {
        self.inner.lock().unwrap().export_queue.push_back(response);
    }

    /// Queue a response for the next `import()` call.
    pub fn queue_import(&self, response: Result<ImportResponse, ApiError>) {
        self.inner.lock().unwrap().import_queue.push_back(response);
    }

    /// Set a sticky response served whenever the full-sync queue is empty.
    pub fn set_default_full_sync(&self, response: FullSyncResponse) {
        self.inner.lock().unwrap().default_full_sync = Some(response);
    }

    /// Delay every response by the given duration.
    ///
    /// Lets a test hold one call in flight while issuing another.
    pub fn set_response_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().response_delay = Some(delay);
    }

    /// Get all recorded `full_sync()` requests.
    pub fn full_sync_requests(&self) -> Vec<FullSyncRequest> {
        self.inner.lock().unwrap().full_sync_requests.clone()
    }

    /// Get all recorded `push()` requests.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.inner.lock().unwrap().push_requests.clone()
    }

    /// Get all recorded `pull()` requests.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.inner.lock().unwrap().pull_requests.clone()
    }

    /// Get all recorded `import()` requests.
    pub fn import_requests(&self) -> Vec<ImportRequest> {
        self.inner.lock().unwrap().import_requests.clone()
    }

    /// How many times `full_sync()` was called.
    pub fn full_sync_calls(&self) -> usize {
        self.inner.lock().unwrap().full_sync_requests.len()
    }

    /// How many times `status()` was called.
    pub fn status_calls(&self) -> usize {
        self.inner.lock().unwrap().status_calls
    }

    /// How many times `export()` was called.
    pub fn export_calls(&self) -> usize {
        self.inner.lock().unwrap().export_calls
    }

    /// Total calls across all endpoints.
    pub fn total_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.full_sync_requests.len()
            + inner.push_requests.len()
            + inner.pull_requests.len()
            + inner.import_requests.len()
            + inner.status_calls
            + inner.export_calls
    }

    /// Clear all queues, recorded requests, and counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockSyncApiInner::default();
    }

    async fn delay(&self) {
        let delay = self.inner.lock().unwrap().response_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn no_response(endpoint: &str) -> ApiError {
        ApiError::Network(format!("no queued response for {endpoint}"))
    }
}

impl Clone for MockSyncApi {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SyncApi for MockSyncApi {
    async fn full_sync(&self, request: &FullSyncRequest) -> Result<FullSyncResponse, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.full_sync_requests.push(request.clone());
            match inner.full_sync_queue.pop_front() {
                Some(result) => result,
                None => match &inner.default_full_sync {
                    Some(response) => Ok(response.clone()),
                    None => Err(Self::no_response("full_sync")),
                },
            }
        };
        self.delay().await;
        result
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.push_requests.push(request.clone());
            inner
                .push_queue
                .pop_front()
                .unwrap_or_else(|| Err(Self::no_response("push")))
        };
        self.delay().await;
        result
    }

    async fn pull(&self, request: &PullRequest) -> Result<PullResponse, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.pull_requests.push(request.clone());
            inner
                .pull_queue
                .pop_front()
                .unwrap_or_else(|| Err(Self::no_response("pull")))
        };
        self.delay().await;
        result
    }

    async fn status(&self) -> Result<ServerStatus, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.status_calls += 1;
            inner
                .status_queue
                .pop_front()
                .unwrap_or_else(|| Err(Self::no_response("status")))
        };
        self.delay().await;
        result
    }

    async fn export(&self) -> Result<ExportPayload, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.export_calls += 1;
            inner
                .export_queue
                .pop_front()
                .unwrap_or_else(|| Err(Self::no_response("export")))
        };
        self.delay().await;
        result
    }

    async fn import(&self, request: &ImportRequest) -> Result<ImportResponse, ApiError> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.import_requests.push(request.clone());
            inner
                .import_queue
                .pop_front()
                .unwrap_or_else(|| Err(Self::no_response("import")))
        };
        self.delay().await;
        result
    }
}
