//! Bridges client authentication state to a fetched token set.

use crate::status::FetchStatus;
use auth_client::{
    ApiTokenMap, AuthError, AuthResult, Client, ClientEvent, ClientStatus, EventBus,
    EventPayload, ListenerHandle, TokenExchangeOptions,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Events broadcast by the token layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenEvent {
    StatusChange,
}

struct TokenState {
    loading: bool,
    tokens: ApiTokenMap,
    error: Option<String>,
    // Bumped when the session ends so late completions from the old
    // session are discarded
    generation: u64,
    // One auto-fetch per authentication session
    auto_fetch_armed: bool,
}

/// Fetches and holds audience-keyed API tokens for the client session.
///
/// Status is derived per read: an unauthenticated client overrides any
/// local sub-state, held tokens mean loaded, an in-flight call means
/// loading, a failed call means error, otherwise the layer is ready to
/// fetch.
pub struct ApiAccessTokenActions {
    client: Arc<Client>,
    auto_options: Option<TokenExchangeOptions>,
    state: Mutex<TokenState>,
    events: EventBus<TokenEvent, FetchStatus>,
    client_listener: Mutex<Option<ListenerHandle<ClientEvent, EventPayload>>>,
}

impl ApiAccessTokenActions {
    /// Create the token layer and subscribe it to client status
    /// changes. `auto_options` enables the automatic fetch that runs
    /// once per transition into `Ready`.
    pub fn new(client: Arc<Client>, auto_options: Option<TokenExchangeOptions>) -> Arc<Self> {
        let actions = Arc::new(Self {
            client: Arc::clone(&client),
            auto_options,
            state: Mutex::new(TokenState {
                loading: false,
                tokens: ApiTokenMap::new(),
                error: None,
                generation: 0,
                auto_fetch_armed: true,
            }),
            events: EventBus::new(),
            client_listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&actions);
        let handle = client.add_listener(ClientEvent::StatusChange, move |payload| {
            if let (Some(actions), EventPayload::Status { status, .. }) =
                (weak.upgrade(), payload)
            {
                actions.handle_client_status(*status);
            }
        });
        *lock_recovering(&actions.client_listener) = Some(handle);

        // The client may already be authenticated when the layer is
        // constructed
        if actions.client.is_authenticated() {
            actions.maybe_auto_fetch();
        }

        actions
    }

    /// Current token-fetch status.
    pub fn status(&self) -> FetchStatus {
        if !self.client.is_authenticated() {
            return FetchStatus::Unauthorized;
        }
        let state = self.lock_state();
        if !state.tokens.is_empty() {
            FetchStatus::Loaded
        } else if state.loading {
            FetchStatus::Loading
        } else if state.error.is_some() {
            FetchStatus::Error
        } else {
            FetchStatus::Ready
        }
    }

    /// Perform a token exchange and hold the result.
    ///
    /// Concurrent calls are not coalesced; the last completion to
    /// arrive wins. A completion that started before the current
    /// session ended is discarded and resolves as `MissingUser` so
    /// tokens from the dead session never reach the caller.
    pub async fn fetch(&self, options: &TokenExchangeOptions) -> AuthResult<ApiTokenMap> {
        let generation = {
            let mut state = self.lock_state();
            state.loading = true;
            // A manual fetch consumes this readiness period
            state.auto_fetch_armed = false;
            state.generation
        };
        self.emit_status();

        let result = self.client.get_api_access_token(options).await;

        let stale = {
            let mut state = self.lock_state();
            if state.generation != generation {
                true
            } else {
                state.loading = false;
                match &result {
                    Ok(tokens) => {
                        state.tokens = tokens.clone();
                        state.error = None;
                    }
                    Err(e) => {
                        state.error = Some(e.to_string());
                    }
                }
                false
            }
        };
        if stale {
            tracing::debug!("Discarding token fetch completion from an ended session");
            return Err(AuthError::MissingUser);
        }

        if let Ok(tokens) = &result {
            // Mirror into the client cache so logout's bulk
            // invalidation covers these tokens too
            self.client.add_api_tokens(tokens.clone());
        }
        self.emit_status();
        result
    }

    /// The held token map, None while unauthenticated or before the
    /// first successful fetch.
    pub fn get_tokens(&self) -> Option<ApiTokenMap> {
        if !self.client.is_authenticated() {
            return None;
        }
        let state = self.lock_state();
        if state.tokens.is_empty() {
            None
        } else {
            Some(state.tokens.clone())
        }
    }

    /// Message of the last failed fetch, if any.
    pub fn get_error_message(&self) -> Option<String> {
        self.lock_state().error.clone()
    }

    /// Subscribe to status changes. Hold the handle to stay subscribed.
    pub fn on_status_change<F>(&self, listener: F) -> ListenerHandle<TokenEvent, FetchStatus>
    where
        F: Fn(&FetchStatus) + Send + Sync + 'static,
    {
        self.events.add_listener(TokenEvent::StatusChange, listener)
    }

    fn handle_client_status(self: &Arc<Self>, status: ClientStatus) {
        if status.is_authenticated() {
            self.maybe_auto_fetch();
            self.emit_status();
        } else if status == ClientStatus::Unauthorized {
            {
                let mut state = self.lock_state();
                state.tokens.clear();
                state.error = None;
                state.loading = false;
                state.generation += 1;
                state.auto_fetch_armed = true;
            }
            self.emit_status();
        }
    }

    fn maybe_auto_fetch(self: &Arc<Self>) {
        let Some(options) = self.auto_options.clone() else {
            return;
        };
        // Leave the latch armed so a readiness observed inside a
        // runtime can still fire
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, skipping automatic api token fetch");
            return;
        };
        if self.status() != FetchStatus::Ready {
            return;
        }
        {
            let mut state = self.lock_state();
            if !state.auto_fetch_armed {
                return;
            }
            state.auto_fetch_armed = false;
        }

        let this = Arc::clone(self);
        runtime.spawn(async move {
            // A manual fetch may have started in the meantime
            if this.status() != FetchStatus::Ready {
                return;
            }
            if let Err(e) = this.fetch(&options).await {
                tracing::warn!(error = %e, "Automatic api token fetch failed");
            }
        });
    }

    fn emit_status(&self) {
        self.events
            .trigger(&TokenEvent::StatusChange, &self.status());
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        lock_recovering(&self.state)
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
