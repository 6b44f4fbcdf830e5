//! Authentication provider.
//!
//! The sync engine never manages credentials itself. It reads the session
//! through [`AuthProvider`] and reacts to session changes via the provider's
//! event stream: login starts syncing, logout stops it and clears local
//! sync state.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use sync_types::DeviceId;

/// Capacity of the auth event channel.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Errors from the authentication provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No session is active.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The session could not be refreshed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user logged in to an existing account.
    LoggedIn,
    /// A new account was registered and logged in.
    Registered,
    /// The user logged out.
    LoggedOut,
    /// The session expired and could not be refreshed.
    SessionExpired,
    /// The access token was refreshed in place.
    TokenRefreshed,
}

/// Trait for session state and credentials.
///
/// `refresh_token` is called by the API layer after a 401 response.
/// Implementations that fail to refresh must clear the session and emit
/// [`AuthEvent::SessionExpired`] before returning the error.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Whether a session is currently active.
    fn is_authenticated(&self) -> bool;

    /// The stable identifier of this device.
    fn device_id(&self) -> DeviceId;

    /// The current access token.
    async fn access_token(&self) -> Result<String, AuthError>;

    /// Exchange the current session for a fresh access token.
    async fn refresh_token(&self) -> Result<(), AuthError>;

    /// Subscribe to session lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Provider backed by a fixed token, for CLI and scripting use.
///
/// There is no refresh flow: if the token is rejected the session is
/// cleared and [`AuthEvent::SessionExpired`] is emitted.
pub struct StaticAuth {
    device_id: DeviceId,
    token: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl StaticAuth {
    /// Create a provider with the given device id and optional token.
    pub fn new(device_id: DeviceId, token: Option<String>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            device_id,
            token: Mutex::new(token),
            events,
        }
    }
}

impl fmt::Debug for StaticAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = self.token.lock().unwrap();
        f.debug_struct("StaticAuth")
            .field("device_id", &self.device_id)
            .field("token", &token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    fn device_id(&self) -> DeviceId {
        self.device_id
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or(AuthError::NotAuthenticated)
    }

    async fn refresh_token(&self) -> Result<(), AuthError> {
        self.token.lock().unwrap().take();
        let _ = self.events.send(AuthEvent::SessionExpired);
        Err(AuthError::RefreshFailed(
            "static token cannot be refreshed".to_string(),
        ))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Scriptable provider for testing.
///
/// Starts logged out. Clones share state, so a test can hold one handle
/// and hand another to the engine.
#[derive(Clone)]
pub struct MockAuth {
    inner: Arc<Mutex<MockAuthInner>>,
    events: broadcast::Sender<AuthEvent>,
}

struct MockAuthInner {
    device_id: DeviceId,
    token: Option<String>,
    refresh_count: u32,
    fail_next_refresh: Option<String>,
}

impl MockAuth {
    /// Create a logged-out provider with a random device id.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MockAuthInner {
                device_id: DeviceId::random(),
                token: None,
                refresh_count: 0,
                fail_next_refresh: None,
            })),
            events,
        }
    }

    /// Create a provider already logged in with the given token.
    pub fn logged_in(token: &str) -> Self {
        let auth = Self::new();
        auth.inner.lock().unwrap().token = Some(token.to_string());
        auth
    }

    /// Activate a session and emit [`AuthEvent::LoggedIn`].
    pub fn log_in(&self, token: &str) {
        self.inner.lock().unwrap().token = Some(token.to_string());
        let _ = self.events.send(AuthEvent::LoggedIn);
    }

    /// Clear the session and emit [`AuthEvent::LoggedOut`].
    pub fn log_out(&self) {
        self.inner.lock().unwrap().token = None;
        let _ = self.events.send(AuthEvent::LoggedOut);
    }

    /// Replace the token without emitting any event.
    pub fn set_token(&self, token: &str) {
        self.inner.lock().unwrap().token = Some(token.to_string());
    }

    /// Cause the next `refresh_token()` to fail with the given error.
    pub fn fail_next_refresh(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_refresh = Some(error.to_string());
    }

    /// How many times `refresh_token()` succeeded.
    pub fn refresh_count(&self) -> u32 {
        self.inner.lock().unwrap().refresh_count
    }
}

impl Default for MockAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockAuth")
            .field("device_id", &inner.device_id)
            .field("token", &inner.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_count", &inner.refresh_count)
            .finish()
    }
}

#[async_trait]
impl AuthProvider for MockAuth {
    fn is_authenticated(&self) -> bool {
        self.inner.lock().unwrap().token.is_some()
    }

    fn device_id(&self) -> DeviceId {
        self.inner.lock().unwrap().device_id
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        self.inner
            .lock()
            .unwrap()
            .token
            .clone()
            .ok_or(AuthError::NotAuthenticated)
    }

    async fn refresh_token(&self) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_refresh.take() {
            inner.token = None;
            drop(inner);
            let _ = self.events.send(AuthEvent::SessionExpired);
            return Err(AuthError::RefreshFailed(error));
        }

        if inner.token.is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        inner.refresh_count += 1;
        let count = inner.refresh_count;
        if let Some(token) = inner.token.as_mut() {
            *token = format!("{token}-r{count}");
        }
        drop(inner);
        let _ = self.events.send(AuthEvent::TokenRefreshed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // StaticAuth Tests
    // ===========================================

    #[tokio::test]
    async fn static_auth_serves_token() {
        let auth = StaticAuth::new(DeviceId::random(), Some("secret-token".to_string()));

        assert!(auth.is_authenticated());
        assert_eq!(auth.access_token().await.unwrap(), "secret-token");
    }

    #[tokio::test]
    async fn static_auth_without_token_is_logged_out() {
        let auth = StaticAuth::new(DeviceId::random(), None);

        assert!(!auth.is_authenticated());
        assert!(matches!(
            auth.access_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn static_auth_refresh_expires_session() {
        let auth = StaticAuth::new(DeviceId::random(), Some("secret-token".to_string()));
        let mut events = auth.subscribe();

        let result = auth.refresh_token().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        assert!(!auth.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);
    }

    // ===========================================
    // MockAuth Tests
    // ===========================================

    #[tokio::test]
    async fn mock_auth_login_logout_cycle() {
        let auth = MockAuth::new();
        let mut events = auth.subscribe();
        assert!(!auth.is_authenticated());

        auth.log_in("token-1");
        assert!(auth.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::LoggedIn);

        auth.log_out();
        assert!(!auth.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::LoggedOut);
    }

    #[tokio::test]
    async fn mock_auth_refresh_rotates_token() {
        let auth = MockAuth::logged_in("token-1");
        let mut events = auth.subscribe();

        auth.refresh_token().await.unwrap();

        assert_eq!(auth.refresh_count(), 1);
        assert_eq!(auth.access_token().await.unwrap(), "token-1-r1");
        assert_eq!(events.try_recv().unwrap(), AuthEvent::TokenRefreshed);
    }

    #[tokio::test]
    async fn mock_auth_forced_refresh_failure_expires_session() {
        let auth = MockAuth::logged_in("token-1");
        let mut events = auth.subscribe();
        auth.fail_next_refresh("refresh token revoked");

        let result = auth.refresh_token().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        assert!(!auth.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);
    }

    #[tokio::test]
    async fn mock_auth_clone_shares_session() {
        let auth1 = MockAuth::new();
        let auth2 = auth1.clone();

        auth1.log_in("token-1");
        assert!(auth2.is_authenticated());
        assert_eq!(auth1.device_id(), auth2.device_id());
    }

    // ===========================================
    // Debug Redaction Tests
    // ===========================================

    #[test]
    fn debug_redacts_tokens() {
        let auth = MockAuth::logged_in("super-secret-token");
        let debug = format!("{auth:?}");

        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("super-secret-token"));

        let static_auth = StaticAuth::new(DeviceId::random(), Some("other-secret".to_string()));
        let debug = format!("{static_auth:?}");

        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("other-secret"));
    }
}
