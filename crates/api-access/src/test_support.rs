//! Shared fixtures for the in-crate tests.

use async_trait::async_trait;
use auth_client::{
    AuthError, AuthResult, Client, OidcSessionManager, SessionEvent, SessionEventCallback,
    TokenExchangeOptions,
};
use client_config::ClientConfig;
use session_store::{MemoryStorage, StoredUser, UserProfile};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Session manager stub that only pushes provider events.
pub struct MockSession {
    listeners: Mutex<Vec<SessionEventCallback>>,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn emit(&self, event: SessionEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(event.clone());
        }
    }

    /// Deliver a user session, driving the client to Authorized.
    pub fn login(&self) {
        self.emit(SessionEvent::UserLoaded(test_user()));
    }

    /// End the session from the provider side.
    pub fn end_session(&self) {
        self.emit(SessionEvent::UserSignedOut);
    }
}

#[async_trait]
impl OidcSessionManager for MockSession {
    async fn signin_silent(&self) -> AuthResult<StoredUser> {
        Err(AuthError::LoginRequired)
    }

    async fn get_user(&self) -> AuthResult<Option<StoredUser>> {
        Ok(None)
    }

    async fn signin_redirect(&self) -> AuthResult<()> {
        Ok(())
    }

    async fn signout_redirect(&self) -> AuthResult<()> {
        Ok(())
    }

    async fn signin_redirect_callback(&self) -> AuthResult<StoredUser> {
        Err(AuthError::Provider("not scripted".to_string()))
    }

    fn subscribe(&self, callback: SessionEventCallback) {
        self.listeners.lock().unwrap().push(callback);
    }
}

pub fn test_user() -> StoredUser {
    StoredUser::new(UserProfile::new("Test User"), "access-token")
}

pub fn test_options() -> TokenExchangeOptions {
    TokenExchangeOptions {
        audience: "https://api.example.com/backend".to_string(),
        permission: "read".to_string(),
        grant_type: "urn:ietf:params:oauth:grant-type:token-exchange".to_string(),
    }
}

/// Client wired to a mock session, with the token exchange endpoint
/// pointing at `authority`.
pub fn client_with_session(authority: &str) -> (Arc<Client>, Arc<MockSession>) {
    let mut config = ClientConfig::default();
    config.authority = authority.to_string();
    let session = MockSession::new();
    let client = Client::new(
        &config,
        Arc::clone(&session) as Arc<dyn OidcSessionManager>,
        Box::new(MemoryStorage::new()),
    )
    .unwrap();
    (client, session)
}

/// Poll until `condition` holds, panicking after about a second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}
