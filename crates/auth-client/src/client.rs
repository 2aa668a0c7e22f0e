//! The session client.
//!
//! Owns the status state machine, the persisted user, the API token
//! cache and the event bus. All status changes go through
//! `on_auth_change`; everything else observes.

use crate::error::{AuthError, AuthResult, ClientErrorKind, ClientErrorObject};
use crate::events::{EventBus, ListenerHandle};
use crate::fsm::{ClientStatus, StatusMachine, StatusMachineInput};
use crate::oidc::{OidcSessionManager, SessionEvent};
use crate::token_exchange::{ApiTokenMap, TokenExchangeClient, TokenExchangeOptions};
use client_config::ClientConfig;
use session_store::{SessionStorage, SessionStore, StoredUser};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Events broadcast on the client bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientEvent {
    /// Status transitioned; payload carries the new status and user
    StatusChange,
    /// A client error was surfaced
    Error,
    /// Logout started; state is about to disappear
    LoggingOut,
    /// The access token expired
    TokenExpired,
    /// The access token is about to expire
    TokenExpiring,
    /// A login or silent renew produced an authenticated session
    ClientAuthSuccess,
}

/// Payload delivered with client events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Status {
        status: ClientStatus,
        user: Option<StoredUser>,
    },
    Error(ClientErrorObject),
    None,
}

/// Raw tokens of the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// OIDC session client.
pub struct Client {
    session: Arc<dyn OidcSessionManager>,
    store: SessionStore,
    token_exchange: Option<TokenExchangeClient>,
    fsm: Mutex<StatusMachine>,
    events: EventBus<ClientEvent, EventPayload>,
    api_tokens: Mutex<ApiTokenMap>,
    error: Mutex<Option<ClientErrorObject>>,
    // Serializes init/handle_callback so only one restoration runs
    init_guard: tokio::sync::Mutex<()>,
    // Set by logout; consumed by the next authorized-to-unauthorized
    // transition to tell an expected logout from a lost session
    logging_out: AtomicBool,
    auto_sign_in: bool,
}

impl Client {
    /// Create a client and wire it to the session manager's events.
    pub fn new(
        config: &ClientConfig,
        session: Arc<dyn OidcSessionManager>,
        storage: Box<dyn SessionStorage>,
    ) -> AuthResult<Arc<Self>> {
        let token_exchange = if config.has_api_token_support() {
            let uri = config
                .token_exchange_uri()
                .map_err(|e| AuthError::Config(e.to_string()))?;
            Some(TokenExchangeClient::new(uri))
        } else {
            None
        };

        let client = Arc::new(Self {
            session: Arc::clone(&session),
            store: SessionStore::new(storage),
            token_exchange,
            fsm: Mutex::new(StatusMachine::new()),
            events: EventBus::new(),
            api_tokens: Mutex::new(ApiTokenMap::new()),
            error: Mutex::new(None),
            init_guard: tokio::sync::Mutex::new(()),
            logging_out: AtomicBool::new(false),
            auto_sign_in: config.auto_sign_in,
        });

        let weak = Arc::downgrade(&client);
        session.subscribe(Box::new(move |event| {
            if let Some(client) = weak.upgrade() {
                client.handle_session_event(event);
            }
        }));

        Ok(client)
    }

    /// Current status.
    pub fn status(&self) -> ClientStatus {
        ClientStatus::from(lock_recovering(&self.fsm).state())
    }

    pub fn is_authenticated(&self) -> bool {
        self.status().is_authenticated()
    }

    pub fn is_initialized(&self) -> bool {
        self.status().is_initialized()
    }

    /// The persisted user, if any.
    pub fn get_user(&self) -> AuthResult<Option<StoredUser>> {
        self.store.get_user().map_err(AuthError::from)
    }

    /// Subscribe to a client event. Hold the handle to stay subscribed.
    pub fn add_listener<F>(&self, event: ClientEvent, listener: F) -> ListenerHandle<ClientEvent, EventPayload>
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.events.add_listener(event, listener)
    }

    /// Initialize the client by restoring a persisted session.
    ///
    /// Idempotent: once initialization has settled, later calls return
    /// the stored user without touching the provider; concurrent calls
    /// wait for the in-flight attempt. A `LoginRequired` outcome is a
    /// normal no-session result, any other provider failure surfaces an
    /// error on the bus and is returned.
    pub async fn init(&self) -> AuthResult<Option<StoredUser>> {
        let _guard = self.init_guard.lock().await;

        if self.status().is_initialized() {
            return self.get_user();
        }

        let status = self.transition(&StatusMachineInput::InitStarted)?;
        self.emit_status_change(status)?;

        let restored = if self.auto_sign_in {
            self.session.signin_silent().await
        } else {
            match self.session.get_user().await {
                Ok(Some(user)) => Ok(user),
                Ok(None) => Err(AuthError::LoginRequired),
                Err(e) => Err(e),
            }
        };

        match restored {
            Ok(user) if !user.is_expired() => {
                self.store.set_user(&user)?;
                self.on_auth_change(true)?;
                Ok(Some(user))
            }
            Ok(_) => {
                // An expired user restored from storage is no user
                self.store.clear_user()?;
                self.on_auth_change(false)?;
                Ok(None)
            }
            Err(e) if e.is_login_required() => {
                self.on_auth_change(false)?;
                Ok(None)
            }
            Err(e) => {
                self.on_auth_change(false)?;
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::InitError,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Complete the OIDC redirect round trip.
    ///
    /// Provider rejection is fatal: the client settles Unauthorized, an
    /// `AuthError` surfaces on the bus and the call returns the error.
    pub async fn handle_callback(&self) -> AuthResult<StoredUser> {
        let _guard = self.init_guard.lock().await;

        if self.status().is_initialized() {
            if let Some(user) = self.get_user()? {
                return Ok(user);
            }
        }

        let status = self.transition(&StatusMachineInput::InitStarted)?;
        self.emit_status_change(status)?;

        match self.session.signin_redirect_callback().await {
            Ok(user) => {
                self.store.set_user(&user)?;
                self.on_auth_change(true)?;
                self.events
                    .trigger(&ClientEvent::ClientAuthSuccess, &EventPayload::None);
                Ok(user)
            }
            Err(e) => {
                self.on_auth_change(false)?;
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::AuthError,
                    e.to_string(),
                ));
                Err(AuthError::CallbackRejected(e.to_string()))
            }
        }
    }

    /// Start an interactive login. No local state changes; the session
    /// arrives later through `handle_callback`.
    pub async fn login(&self) -> AuthResult<()> {
        self.session.signin_redirect().await
    }

    /// Log out: announce first so dependents can mark themselves stale,
    /// then drop all session state and redirect to the provider.
    pub async fn logout(&self) -> AuthResult<()> {
        self.logging_out.store(true, Ordering::SeqCst);
        self.events
            .trigger(&ClientEvent::LoggingOut, &EventPayload::None);

        self.store.clear_user()?;
        self.on_auth_change(false)?;
        self.logging_out.store(false, Ordering::SeqCst);

        self.session.signout_redirect().await
    }

    /// The sole status mutation primitive.
    ///
    /// Returns false without any event when the client is initialized
    /// and already in the requested authentication state. An
    /// authorized-to-unauthorized transition without a pending logout
    /// is surfaced as `UnexpectedAuthChange`.
    pub fn on_auth_change(&self, authenticated: bool) -> AuthResult<bool> {
        let previous = self.status();
        if previous.is_initialized() && previous.is_authenticated() == authenticated {
            return Ok(false);
        }

        let input = if authenticated {
            StatusMachineInput::GainedAuth
        } else {
            StatusMachineInput::LostAuth
        };
        let status = self.transition(&input)?;

        if !authenticated {
            self.clear_api_tokens();
            if previous == ClientStatus::Authorized
                && !self.logging_out.swap(false, Ordering::SeqCst)
            {
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::UnexpectedAuthChange,
                    "Authentication was lost without a logout",
                ));
            }
        }

        self.emit_status_change(status)?;
        Ok(true)
    }

    /// Exchange the stored user's access token for audience-scoped API
    /// tokens. Does not touch the client token cache; callers own token
    /// storage.
    pub async fn get_api_access_token(
        &self,
        options: &TokenExchangeOptions,
    ) -> AuthResult<ApiTokenMap> {
        let exchange = self
            .token_exchange
            .as_ref()
            .ok_or_else(|| AuthError::Config("Token exchange is not configured".to_string()))?;
        let user = self.get_user()?.ok_or(AuthError::MissingUser)?;
        exchange.exchange(&user.access_token, options).await
    }

    /// Merge tokens into the cache, returning the merged map.
    pub fn add_api_tokens(&self, tokens: ApiTokenMap) -> ApiTokenMap {
        let mut cache = lock_recovering(&self.api_tokens);
        cache.extend(tokens);
        cache.clone()
    }

    /// Remove one audience's token, returning the remaining map.
    pub fn remove_api_token(&self, audience: &str) -> ApiTokenMap {
        let mut cache = lock_recovering(&self.api_tokens);
        cache.remove(audience);
        cache.clone()
    }

    /// Snapshot of the cached token map.
    pub fn get_api_tokens(&self) -> ApiTokenMap {
        lock_recovering(&self.api_tokens).clone()
    }

    pub fn clear_api_tokens(&self) {
        lock_recovering(&self.api_tokens).clear();
    }

    /// Surface an error, replacing any current one.
    pub fn set_error(&self, error: ClientErrorObject) {
        *lock_recovering(&self.error) = Some(error.clone());
        tracing::warn!(kind = ?error.kind, message = %error.message, "Client error");
        self.events
            .trigger(&ClientEvent::Error, &EventPayload::Error(error));
    }

    /// The currently surfaced error, if any.
    pub fn current_error(&self) -> Option<ClientErrorObject> {
        lock_recovering(&self.error).clone()
    }

    pub fn dismiss_error(&self) {
        *lock_recovering(&self.error) = None;
    }

    /// Re-read the user from the provider, updating the stored record.
    /// Failures surface as `LoadError`.
    pub async fn load_user_profile(&self) -> AuthResult<StoredUser> {
        match self.session.get_user().await {
            Ok(Some(user)) => {
                self.store.set_user(&user)?;
                Ok(user)
            }
            Ok(None) => {
                let e = AuthError::MissingUser;
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::LoadError,
                    e.to_string(),
                ));
                Err(e)
            }
            Err(e) => {
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::LoadError,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Session tokens of the authenticated user, None when logged out.
    pub fn get_user_tokens(&self) -> AuthResult<Option<UserTokens>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        Ok(self.get_user()?.map(|user| UserTokens {
            access_token: user.access_token,
            id_token: user.id_token,
            refresh_token: user.refresh_token,
        }))
    }

    /// The stored user, or an initialization attempt when none exists.
    pub async fn get_or_load_user(&self) -> AuthResult<Option<StoredUser>> {
        if let Some(user) = self.get_user()? {
            return Ok(Some(user));
        }
        self.init().await
    }

    /// Drop status, user, token cache and error together. Test teardown
    /// helper; a live client never goes back to Uninitialized.
    pub fn reset(&self) -> AuthResult<()> {
        *lock_recovering(&self.fsm) = StatusMachine::new();
        self.store.clear_user()?;
        self.clear_api_tokens();
        self.dismiss_error();
        self.logging_out.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn transition(&self, input: &StatusMachineInput) -> AuthResult<ClientStatus> {
        let mut fsm = lock_recovering(&self.fsm);
        fsm.consume(input)
            .map_err(|_| AuthError::InvalidStateTransition {
                from: format!("{:?}", ClientStatus::from(fsm.state())),
                input: format!("{input:?}"),
            })?;
        Ok(ClientStatus::from(fsm.state()))
    }

    fn emit_status_change(&self, status: ClientStatus) -> AuthResult<()> {
        let user = self.store.get_user()?;
        tracing::debug!(?status, "Client status changed");
        self.events
            .trigger(&ClientEvent::StatusChange, &EventPayload::Status { status, user });
        Ok(())
    }

    fn handle_session_event(&self, event: SessionEvent) {
        let result = match event {
            SessionEvent::UserLoaded(user) => self.on_user_loaded(user),
            SessionEvent::UserUnloaded
            | SessionEvent::UserSignedOut
            | SessionEvent::UserSessionChanged => self
                .store
                .clear_user()
                .map_err(AuthError::from)
                .and_then(|_| self.on_auth_change(false).map(|_| ())),
            SessionEvent::SilentRenewError(message) => {
                self.set_error(ClientErrorObject::new(
                    ClientErrorKind::AuthRefreshError,
                    message,
                ));
                Ok(())
            }
            SessionEvent::AccessTokenExpired => {
                self.events
                    .trigger(&ClientEvent::TokenExpired, &EventPayload::None);
                Ok(())
            }
            SessionEvent::AccessTokenExpiring => {
                self.events
                    .trigger(&ClientEvent::TokenExpiring, &EventPayload::None);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to handle session event");
        }
    }

    fn on_user_loaded(&self, user: StoredUser) -> AuthResult<()> {
        if user.is_expired() {
            tracing::debug!("Ignoring expired user from provider");
            return Ok(());
        }
        self.store.set_user(&user)?;
        if self.on_auth_change(true)? {
            self.events
                .trigger(&ClientEvent::ClientAuthSuccess, &EventPayload::None);
        }
        Ok(())
    }
}

// A panic while holding one of these locks cannot leave state
// half-written, so recovery is always safe
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
