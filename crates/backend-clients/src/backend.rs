//! REST demo backend client.

use api_access::{
    ApiAccessTokenActions, AuthorizedApiRequest, AuthorizedRequestFn, AuthorizedRequestProps,
    RequestError, RequestProps,
};
use auth_client::ApiTokenMap;
use client_config::ClientConfig;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload of the demo backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetData {
    pub pet_name: String,
}

/// Bearer-authenticated client for the demo backend.
///
/// Reads with `GET`; a call carrying data writes with `PUT` and a JSON
/// body.
pub struct BackendClient {
    http: reqwest::Client,
    url: String,
    audience: String,
}

impl BackendClient {
    pub fn new(url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            audience: audience.into(),
        }
    }

    /// Client from configuration, when both the backend URL and its
    /// audience are set.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        Some(Self::new(
            config.backend_url.clone()?,
            config.backend_audience.clone()?,
        ))
    }

    /// The token authorizing calls to this backend.
    pub fn api_token(&self, tokens: &ApiTokenMap) -> Option<String> {
        tokens.get(&self.audience).cloned()
    }

    /// Perform one backend call with the fetched tokens.
    pub async fn execute(
        &self,
        props: AuthorizedRequestProps<PetData>,
    ) -> Result<PetData, RequestError> {
        let token = self
            .api_token(&props.api_tokens)
            .ok_or_else(|| RequestError::MissingToken(self.audience.clone()))?;

        let request = match props.data {
            Some(data) => self.http.put(&self.url).json(&data),
            None => self.http.get(&self.url),
        };
        let response = request
            .bearer_auth(token)
            .header("content-type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status, "Backend call failed");
            return Err(RequestError::Status { status, body });
        }

        response
            .json::<PetData>()
            .await
            .map_err(|e| RequestError::InvalidBody(e.to_string()))
    }

    /// The backend call as an orchestrator request function.
    pub fn request_fn(self: &Arc<Self>) -> AuthorizedRequestFn<PetData, PetData> {
        let client = Arc::clone(self);
        Arc::new(move |props| {
            let client = Arc::clone(&client);
            async move { client.execute(props).await }.boxed()
        })
    }

    /// Wire this backend into an `AuthorizedApiRequest`.
    pub fn authorized_requests(
        self: &Arc<Self>,
        tokens: Arc<ApiAccessTokenActions>,
        auto_fetch: Option<RequestProps<PetData>>,
    ) -> Arc<AuthorizedApiRequest<PetData, PetData>> {
        AuthorizedApiRequest::new(tokens, self.request_fn(), auto_fetch)
    }
}
