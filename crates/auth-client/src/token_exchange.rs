//! HTTP client for the token exchange endpoint.

use crate::error::{AuthError, AuthResult};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// Mapping from audience identifier to a signed token string.
pub type ApiTokenMap = HashMap<String, String>;

/// Parameters of one token exchange call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchangeOptions {
    pub audience: String,
    pub permission: String,
    pub grant_type: String,
}

impl TokenExchangeOptions {
    /// Options from the configured audience/permission/grant type, when
    /// all three are present.
    pub fn from_config(config: &client_config::ClientConfig) -> Option<Self> {
        Some(Self {
            audience: config.api_audience.clone()?,
            permission: config.api_permission.clone()?,
            grant_type: config.api_grant_type.clone()?,
        })
    }
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    audience: &'a str,
    permission: &'a str,
    grant_type: &'a str,
}

/// Exchanges an identity session for audience-scoped API tokens.
pub struct TokenExchangeClient {
    http: reqwest::Client,
    uri: Url,
}

impl TokenExchangeClient {
    pub fn new(uri: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            uri,
        }
    }

    /// Endpoint this client posts to.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Exchange the user's access token for audience-scoped tokens.
    ///
    /// A 2xx response body is a JSON map from audience to token.
    pub async fn exchange(
        &self,
        access_token: &str,
        options: &TokenExchangeOptions,
    ) -> AuthResult<ApiTokenMap> {
        let body = TokenExchangeRequest {
            audience: &options.audience,
            permission: &options.permission,
            grant_type: &options.grant_type,
        };

        let response = self
            .http
            .post(self.uri.clone())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status, audience = %options.audience, "Token exchange failed");
            return Err(AuthError::TokenExchange { status, message });
        }

        let tokens: ApiTokenMap = response.json().await?;
        tracing::debug!(count = tokens.len(), "Token exchange succeeded");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_options() -> TokenExchangeOptions {
        TokenExchangeOptions {
            audience: "https://api.example.com/backend".to_string(),
            permission: "read".to_string(),
            grant_type: "urn:ietf:params:oauth:grant-type:token-exchange".to_string(),
        }
    }

    fn client_for(server: &MockServer) -> TokenExchangeClient {
        let uri = Url::parse(&format!("{}/api-tokens/", server.uri())).unwrap();
        TokenExchangeClient::new(uri)
    }

    #[tokio::test]
    async fn test_exchange_decodes_token_map() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api-tokens/"))
            .and(header("authorization", "Bearer access-token"))
            .and(body_json(serde_json::json!({
                "audience": "https://api.example.com/backend",
                "permission": "read",
                "grant_type": "urn:ietf:params:oauth:grant-type:token-exchange",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "https://api.example.com/backend": "apiToken",
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tokens = client
            .exchange("access-token", &test_options())
            .await
            .unwrap();

        assert_eq!(
            tokens.get("https://api.example.com/backend").map(String::as_str),
            Some("apiToken")
        );
    }

    #[tokio::test]
    async fn test_exchange_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api-tokens/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .exchange("stale-token", &test_options())
            .await
            .unwrap_err();

        match err {
            AuthError::TokenExchange { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid token");
            }
            other => panic!("expected TokenExchange error, got {other:?}"),
        }
    }
}
