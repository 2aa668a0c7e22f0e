//! Generic orchestration of token-consuming requests.

use crate::error::RequestError;
use crate::status::FetchStatus;
use crate::token_actions::{ApiAccessTokenActions, TokenEvent};
use auth_client::{ApiTokenMap, ListenerHandle};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard};

/// Caller-supplied parameters for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestProps<P> {
    pub data: Option<P>,
}

/// What the wrapped request function receives: the caller parameters
/// plus the fetched token map.
#[derive(Debug, Clone)]
pub struct AuthorizedRequestProps<P> {
    pub data: Option<P>,
    pub api_tokens: ApiTokenMap,
}

/// The wrapped asynchronous request function.
pub type AuthorizedRequestFn<R, P> = Arc<
    dyn Fn(AuthorizedRequestProps<P>) -> BoxFuture<'static, Result<R, RequestError>>
        + Send
        + Sync,
>;

struct RequestState<R, P> {
    // None means no request has run yet ("waiting")
    sub_status: Option<FetchStatus>,
    result: Option<R>,
    error: Option<String>,
    // One-shot: consumed the first time the combined status is ready
    auto_fetch: Option<RequestProps<P>>,
}

/// Composes the token layer with an arbitrary request function.
///
/// The combined status is derived per read: loaded tokens mean ready,
/// a token error dominates, otherwise the local request sub-status
/// shows through, defaulting to waiting.
pub struct AuthorizedApiRequest<R, P> {
    tokens: Arc<ApiAccessTokenActions>,
    request_fn: AuthorizedRequestFn<R, P>,
    state: Mutex<RequestState<R, P>>,
    token_listener: Mutex<Option<ListenerHandle<TokenEvent, FetchStatus>>>,
}

impl<R, P> AuthorizedApiRequest<R, P>
where
    R: Clone + Send + 'static,
    P: Send + 'static,
{
    /// Create an orchestrator over the token layer.
    ///
    /// When `auto_fetch` props are given, the wrapped function is
    /// invoked exactly once, the first time the combined status
    /// reaches ready; the props are consumed and never re-fire.
    pub fn new(
        tokens: Arc<ApiAccessTokenActions>,
        request_fn: AuthorizedRequestFn<R, P>,
        auto_fetch: Option<RequestProps<P>>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            tokens: Arc::clone(&tokens),
            request_fn,
            state: Mutex::new(RequestState {
                sub_status: None,
                result: None,
                error: None,
                auto_fetch,
            }),
            token_listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&orchestrator);
        let handle = tokens.on_status_change(move |status| {
            if let Some(this) = weak.upgrade() {
                this.handle_token_status(*status);
            }
        });
        *lock_recovering(&orchestrator.token_listener) = Some(handle);

        // Tokens may already be loaded when the orchestrator is built
        orchestrator.handle_token_status(orchestrator.tokens.status());

        orchestrator
    }

    /// Combined status of the token layer and the local request.
    pub fn status(&self) -> FetchStatus {
        self.invalidate_if_unauthorized();
        let token_status = self.tokens.status();
        if token_status == FetchStatus::Loaded {
            return FetchStatus::Ready;
        }
        if token_status == FetchStatus::Error {
            return FetchStatus::Error;
        }
        match self.lock_state().sub_status {
            Some(
                status @ (FetchStatus::Loading | FetchStatus::Loaded | FetchStatus::Error),
            ) => status,
            _ => FetchStatus::Waiting,
        }
    }

    /// Run the wrapped request function with the fetched tokens.
    ///
    /// Guarded: unless the token layer is loaded, this records an
    /// error and resolves without calling the wrapped function. On
    /// failure the error is sticky until the next success or `clear`.
    pub async fn request(&self, props: Option<RequestProps<P>>) -> Option<R> {
        if self.tokens.status() != FetchStatus::Loaded {
            let mut state = self.lock_state();
            state.error = Some(RequestError::TokensNotFetched.to_string());
            return None;
        }
        self.run_request(props).await
    }

    /// The result of the last successful request.
    pub fn get_data(&self) -> Option<R> {
        self.invalidate_if_unauthorized();
        self.lock_state().result.clone()
    }

    /// Status of the local request alone.
    pub fn get_request_status(&self) -> FetchStatus {
        self.invalidate_if_unauthorized();
        self.lock_state().sub_status.unwrap_or(FetchStatus::Waiting)
    }

    /// Message of the last request failure, if any.
    pub fn get_request_error(&self) -> Option<String> {
        self.invalidate_if_unauthorized();
        self.lock_state().error.clone()
    }

    pub fn get_api_token_status(&self) -> FetchStatus {
        self.tokens.status()
    }

    pub fn get_api_token_error(&self) -> Option<String> {
        self.tokens.get_error_message()
    }

    pub fn get_tokens(&self) -> Option<ApiTokenMap> {
        self.tokens.get_tokens()
    }

    /// Drop the held result and error. Request status history is kept.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.result = None;
        state.error = None;
    }

    async fn run_request(&self, props: Option<RequestProps<P>>) -> Option<R> {
        {
            let mut state = self.lock_state();
            state.sub_status = Some(FetchStatus::Loading);
        }

        let api_tokens = self.tokens.get_tokens().unwrap_or_default();
        let data = props.and_then(|p| p.data);
        let future = (self.request_fn)(AuthorizedRequestProps { data, api_tokens });

        match future.await {
            Ok(result) => {
                let mut state = self.lock_state();
                state.sub_status = Some(FetchStatus::Loaded);
                state.result = Some(result.clone());
                state.error = None;
                Some(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Authorized request failed");
                let mut state = self.lock_state();
                state.sub_status = Some(FetchStatus::Error);
                state.error = Some(e.to_string());
                state.result = None;
                None
            }
        }
    }

    fn handle_token_status(self: &Arc<Self>, status: FetchStatus) {
        match status {
            FetchStatus::Unauthorized => self.invalidate_if_unauthorized(),
            FetchStatus::Loaded => {
                // Keep the props until an emission arrives inside a
                // runtime
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!("No tokio runtime, deferring automatic request");
                    return;
                };
                let props = self.lock_state().auto_fetch.take();
                if let Some(props) = props {
                    let this = Arc::clone(self);
                    runtime.spawn(async move {
                        this.run_request(Some(props)).await;
                    });
                }
            }
            _ => {}
        }
    }

    // Logging out actively invalidates a held result instead of just
    // stopping future fetches
    fn invalidate_if_unauthorized(&self) {
        if self.tokens.status() != FetchStatus::Unauthorized {
            return;
        }
        let mut state = self.lock_state();
        if state.result.is_some() {
            state.result = None;
            state.error = Some(RequestError::Unauthorized.to_string());
            state.sub_status = Some(FetchStatus::Error);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RequestState<R, P>> {
        lock_recovering(&self.state)
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{client_with_session, test_options, wait_until, MockSession};
    use auth_client::Client;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq)]
    struct PetData {
        pet_name: String,
    }

    struct Stack {
        actions: Arc<ApiAccessTokenActions>,
        session: Arc<MockSession>,
        _client: Arc<Client>,
    }

    async fn token_stack(server: &MockServer) -> Stack {
        Mock::given(method("POST"))
            .and(path("/api-tokens/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "https://api.example.com/backend": "apiToken",
            })))
            .mount(server)
            .await;
        let (client, session) = client_with_session(&server.uri());
        let actions = ApiAccessTokenActions::new(Arc::clone(&client), Some(test_options()));
        Stack {
            actions,
            session,
            _client: client,
        }
    }

    /// Request fn that records each invocation and succeeds.
    fn recording_request_fn(
        calls: Arc<Mutex<Vec<AuthorizedRequestProps<bool>>>>,
    ) -> AuthorizedRequestFn<PetData, bool> {
        Arc::new(move |props| {
            calls.lock().unwrap().push(props);
            async move {
                Ok(PetData {
                    pet_name: "Turre".to_string(),
                })
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_auto_fetch_fires_once_with_merged_props() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = AuthorizedApiRequest::new(
            Arc::clone(&stack.actions),
            recording_request_fn(Arc::clone(&calls)),
            Some(RequestProps { data: Some(true) }),
        );

        stack.session.login();
        wait_until(|| orchestrator.get_data().is_some()).await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].data, Some(true));
        assert_eq!(
            recorded[0]
                .api_tokens
                .get("https://api.example.com/backend")
                .map(String::as_str),
            Some("apiToken")
        );
        drop(recorded);

        // Cycling back to ready must not re-fire the auto fetch
        stack.session.end_session();
        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_auto_fetch_without_props() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = AuthorizedApiRequest::new(
            Arc::clone(&stack.actions),
            recording_request_fn(Arc::clone(&calls)),
            None,
        );

        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(orchestrator.status(), FetchStatus::Ready);
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Waiting);
    }

    #[tokio::test]
    async fn test_manual_requests_replace_result() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let request_fn: AuthorizedRequestFn<PetData, bool> = Arc::new(move |_props| {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(PetData {
                    pet_name: format!("pet-{n}"),
                })
            }
            .boxed()
        });
        let orchestrator = AuthorizedApiRequest::new(Arc::clone(&stack.actions), request_fn, None);

        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;

        let first = orchestrator.request(None).await.unwrap();
        assert_eq!(first.pet_name, "pet-0");
        let second = orchestrator.request(None).await.unwrap();
        assert_eq!(second.pet_name, "pet-1");
        assert_eq!(orchestrator.get_data().unwrap().pet_name, "pet-1");
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Loaded);
    }

    #[tokio::test]
    async fn test_failed_request_then_success_clears_error() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let request_fn: AuthorizedRequestFn<PetData, bool> = Arc::new(move |_props| {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RequestError::Status {
                        status: 500,
                        body: "backend down".to_string(),
                    })
                } else {
                    Ok(PetData {
                        pet_name: "Turre".to_string(),
                    })
                }
            }
            .boxed()
        });
        let orchestrator = AuthorizedApiRequest::new(Arc::clone(&stack.actions), request_fn, None);

        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;

        assert!(orchestrator.request(None).await.is_none());
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Error);
        assert_eq!(
            orchestrator.get_request_error().unwrap(),
            "Status:500. Message: backend down"
        );
        assert!(orchestrator.get_data().is_none());

        let result = orchestrator.request(None).await.unwrap();
        assert_eq!(result.pet_name, "Turre");
        assert!(orchestrator.get_request_error().is_none());
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Loaded);
    }

    #[tokio::test]
    async fn test_request_without_tokens_never_calls_wrapped_fn() {
        let server = MockServer::start().await;
        let (client, session) = client_with_session(&server.uri());
        // No token endpoint mounted and no auto options: tokens stay
        // unfetched even though the client is authenticated
        let actions = ApiAccessTokenActions::new(client, None);
        session.login();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator =
            AuthorizedApiRequest::new(actions, recording_request_fn(Arc::clone(&calls)), None);

        let result = orchestrator.request(None).await;

        assert!(result.is_none());
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(
            orchestrator.get_request_error().unwrap(),
            "Api tokens are not fetched."
        );
        // The guard records an error without touching request status
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Waiting);
    }

    #[tokio::test]
    async fn test_logout_invalidates_held_result() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = AuthorizedApiRequest::new(
            Arc::clone(&stack.actions),
            recording_request_fn(Arc::clone(&calls)),
            None,
        );

        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;
        orchestrator.request(None).await.unwrap();
        assert!(orchestrator.get_data().is_some());

        stack.session.end_session();

        assert!(orchestrator.get_data().is_none());
        assert_eq!(
            orchestrator.get_request_error().unwrap(),
            "User is unauthorized"
        );
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Error);
    }

    #[tokio::test]
    async fn test_clear_drops_result_and_error_only() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = AuthorizedApiRequest::new(
            Arc::clone(&stack.actions),
            recording_request_fn(Arc::clone(&calls)),
            None,
        );

        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;
        orchestrator.request(None).await.unwrap();

        orchestrator.clear();

        assert!(orchestrator.get_data().is_none());
        assert!(orchestrator.get_request_error().is_none());
        assert_eq!(orchestrator.get_request_status(), FetchStatus::Loaded);
    }

    #[tokio::test]
    async fn test_tokens_already_loaded_at_construction_triggers_auto_fetch() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = AuthorizedApiRequest::new(
            Arc::clone(&stack.actions),
            recording_request_fn(Arc::clone(&calls)),
            Some(RequestProps { data: None }),
        );

        wait_until(|| orchestrator.get_data().is_some()).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_loaded_event_outside_runtime_defers_auto_fetch() {
        let server = MockServer::start().await;
        let stack = token_stack(&server).await;
        stack.session.login();
        wait_until(|| stack.actions.status() == FetchStatus::Loaded).await;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let actions = Arc::clone(&stack.actions);
        let request_fn = recording_request_fn(Arc::clone(&calls));
        // Constructed on a thread with no runtime while tokens are
        // already loaded; must not panic and must keep the props
        let orchestrator = std::thread::spawn(move || {
            AuthorizedApiRequest::new(actions, request_fn, Some(RequestProps { data: Some(true) }))
        })
        .join()
        .unwrap();
        assert!(calls.lock().unwrap().is_empty());

        // The next loaded emission inside the runtime fires the request
        stack.actions.fetch(&test_options()).await.unwrap();
        wait_until(|| orchestrator.get_data().is_some()).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
