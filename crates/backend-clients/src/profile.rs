//! GraphQL profile backend client.

use api_access::{
    ApiAccessTokenActions, AuthorizedApiRequest, AuthorizedRequestFn, AuthorizedRequestProps,
    RequestError, RequestProps,
};
use auth_client::ApiTokenMap;
use client_config::ClientConfig;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MY_PROFILE_QUERY: &str = "\
query MyProfileQuery {
  myProfile {
    id
    firstName
    lastName
    nickname
    language
    emails {
      edges {
        node {
          email
        }
      }
    }
  }
}";

/// Flattened profile record exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProfileData {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub language: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct ProfileQueryResult {
    data: Option<QueryData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(rename = "myProfile")]
    my_profile: Option<RawProfile>,
}

#[derive(Deserialize)]
struct RawProfile {
    id: Option<String>,
    #[serde(rename = "firstName")]
    first_name: Option<String>,
    #[serde(rename = "lastName")]
    last_name: Option<String>,
    nickname: Option<String>,
    language: Option<String>,
    emails: Option<EmailConnection>,
}

#[derive(Deserialize)]
struct EmailConnection {
    edges: Vec<EmailEdge>,
}

#[derive(Deserialize)]
struct EmailEdge {
    node: Option<EmailNode>,
}

#[derive(Deserialize)]
struct EmailNode {
    email: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

fn convert_profile(profile: RawProfile) -> ProfileData {
    let email = profile
        .emails
        .and_then(|connection| connection.edges.into_iter().next())
        .and_then(|edge| edge.node)
        .and_then(|node| node.email);
    ProfileData {
        id: profile.id,
        first_name: profile.first_name,
        last_name: profile.last_name,
        nickname: profile.nickname,
        language: profile.language,
        email,
    }
}

/// Bearer-authenticated GraphQL client for the profile backend.
pub struct ProfileClient {
    http: reqwest::Client,
    url: String,
    audience: String,
}

impl ProfileClient {
    pub fn new(url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            audience: audience.into(),
        }
    }

    /// Client from configuration, when both the profile backend URL
    /// and its audience are set.
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        Some(Self::new(
            config.profile_backend_url.clone()?,
            config.profile_audience.clone()?,
        ))
    }

    /// The token authorizing calls to the profile backend.
    pub fn api_token(&self, tokens: &ApiTokenMap) -> Option<String> {
        tokens.get(&self.audience).cloned()
    }

    /// Fetch and flatten the profile.
    pub async fn execute(
        &self,
        props: AuthorizedRequestProps<()>,
    ) -> Result<ProfileData, RequestError> {
        let token = self
            .api_token(&props.api_tokens)
            .ok_or_else(|| RequestError::MissingToken(self.audience.clone()))?;

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": MY_PROFILE_QUERY }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status, "Profile query failed");
            return Err(RequestError::Status { status, body });
        }

        let result: ProfileQueryResult = response
            .json()
            .await
            .map_err(|e| RequestError::InvalidBody(e.to_string()))?;

        match result.data.and_then(|data| data.my_profile) {
            Some(profile) => Ok(convert_profile(profile)),
            None => {
                let message = result
                    .errors
                    .and_then(|errors| errors.into_iter().next())
                    .map(|error| error.message)
                    .unwrap_or_else(|| "Query result is missing myProfile".to_string());
                Err(RequestError::Query(message))
            }
        }
    }

    /// The profile query as an orchestrator request function.
    pub fn request_fn(self: &Arc<Self>) -> AuthorizedRequestFn<ProfileData, ()> {
        let client = Arc::clone(self);
        Arc::new(move |props| {
            let client = Arc::clone(&client);
            async move { client.execute(props).await }.boxed()
        })
    }

    /// Wire the profile backend into an `AuthorizedApiRequest`.
    pub fn authorized_requests(
        self: &Arc<Self>,
        tokens: Arc<ApiAccessTokenActions>,
        auto_fetch: Option<RequestProps<()>>,
    ) -> Arc<AuthorizedApiRequest<ProfileData, ()>> {
        AuthorizedApiRequest::new(tokens, self.request_fn(), auto_fetch)
    }
}
