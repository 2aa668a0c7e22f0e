//! Boundary to the external OIDC session manager.
//!
//! The client never speaks the OIDC wire protocol itself; it drives an
//! implementation of this trait and reacts to the events it pushes.

use crate::error::AuthResult;
use async_trait::async_trait;
use session_store::StoredUser;

/// Events pushed by the session manager.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A user session became available (login, silent renew)
    UserLoaded(StoredUser),
    /// The user session was removed
    UserUnloaded,
    /// The user signed out at the provider
    UserSignedOut,
    /// The provider reported a session change
    UserSessionChanged,
    /// Background renewal failed
    SilentRenewError(String),
    /// The access token expired
    AccessTokenExpired,
    /// The access token is about to expire
    AccessTokenExpiring,
}

/// Callback invoked for every provider event.
pub type SessionEventCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Operations the client requires from an OIDC session manager.
#[async_trait]
pub trait OidcSessionManager: Send + Sync {
    /// Attempt to restore a session without user interaction.
    ///
    /// Returns `AuthError::LoginRequired` when no session exists.
    async fn signin_silent(&self) -> AuthResult<StoredUser>;

    /// Get the current user from the manager's own storage, if any.
    async fn get_user(&self) -> AuthResult<Option<StoredUser>>;

    /// Start an interactive login redirect. Fire and forget; the
    /// session arrives later through `signin_redirect_callback`.
    async fn signin_redirect(&self) -> AuthResult<()>;

    /// Start the provider logout redirect.
    async fn signout_redirect(&self) -> AuthResult<()>;

    /// Complete the redirect round trip after the provider sends the
    /// browser back.
    async fn signin_redirect_callback(&self) -> AuthResult<StoredUser>;

    /// Register a callback for provider events.
    fn subscribe(&self, callback: SessionEventCallback);
}
