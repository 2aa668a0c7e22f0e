//! Client configuration with defaults, file and environment layering.

use crate::error::{CoreError, CoreResult};
use crate::paths::Paths;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default OIDC authority when none is configured.
pub const DEFAULT_AUTHORITY: &str = "https://tunnistamo.test.kuva.hel.ninja";

/// Default OIDC client id when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "https://api.hel.fi/auth/example-ui-profile";

/// Configuration for the profile client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// OIDC authority base URL
    pub authority: String,

    /// OIDC client id
    pub client_id: String,

    /// Path the authority redirects back to after login
    pub callback_path: String,

    /// Path the authority redirects back to after logout
    pub logout_path: String,

    /// Path used for silent renew round trips
    pub silent_auth_path: String,

    /// OIDC response type
    pub response_type: String,

    /// Space separated scopes requested at login
    pub scope: String,

    /// Attempt a silent sign-in during initialization
    pub auto_sign_in: bool,

    /// Renew the session in the background before expiry
    pub automatic_silent_renew: bool,

    /// Emit debug logging from the session layer
    pub enable_logging: bool,

    /// Path of the token exchange endpoint, relative to the authority
    pub token_exchange_path: String,

    /// Audience requested from the token exchange endpoint
    pub api_audience: Option<String>,

    /// Permission requested from the token exchange endpoint
    pub api_permission: Option<String>,

    /// Grant type sent to the token exchange endpoint
    pub api_grant_type: Option<String>,

    /// Base URL of the example backend
    pub backend_url: Option<String>,

    /// Audience whose token authorizes example backend calls
    pub backend_audience: Option<String>,

    /// GraphQL endpoint of the profile backend
    pub profile_backend_url: Option<String>,

    /// Audience whose token authorizes profile backend calls
    pub profile_audience: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            callback_path: "/callback".to_string(),
            logout_path: "/".to_string(),
            silent_auth_path: "/silent_renew.html".to_string(),
            response_type: "id_token token".to_string(),
            scope: "openid profile https://api.hel.fi/auth/helsinkiprofile".to_string(),
            auto_sign_in: true,
            automatic_silent_renew: true,
            enable_logging: false,
            token_exchange_path: "/api-tokens/".to_string(),
            api_audience: None,
            api_permission: None,
            api_grant_type: None,
            backend_url: None,
            backend_audience: None,
            profile_backend_url: None,
            profile_audience: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration, merging defaults, the config file and
    /// environment variables in that order.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let mut config = Self::default();

        let config_file = paths.config_file();
        if config_file.exists() {
            config = Self::load_from_file(&config_file)?;
        }

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &std::path::Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), contents)?;
        Ok(())
    }

    /// Override fields from environment variables.
    pub fn load_from_env(&mut self) {
        if let Ok(authority) = std::env::var("CLIENT_OIDC_AUTHORITY") {
            self.authority = authority;
        }
        if let Ok(client_id) = std::env::var("CLIENT_OIDC_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Ok(scope) = std::env::var("CLIENT_OIDC_SCOPE") {
            self.scope = scope;
        }
        if let Ok(value) = std::env::var("CLIENT_AUTO_SIGN_IN") {
            self.auto_sign_in = env_value_to_bool(Some(&value), self.auto_sign_in);
        }
        if let Ok(value) = std::env::var("CLIENT_SILENT_RENEW") {
            self.automatic_silent_renew = env_value_to_bool(Some(&value), self.automatic_silent_renew);
        }
        if let Ok(value) = std::env::var("CLIENT_ENABLE_LOGGING") {
            self.enable_logging = env_value_to_bool(Some(&value), self.enable_logging);
        }
        if let Ok(audience) = std::env::var("CLIENT_API_AUDIENCE") {
            self.api_audience = Some(audience);
        }
        if let Ok(permission) = std::env::var("CLIENT_API_PERMISSION") {
            self.api_permission = Some(permission);
        }
        if let Ok(grant_type) = std::env::var("CLIENT_API_GRANT_TYPE") {
            self.api_grant_type = Some(grant_type);
        }
        if let Ok(backend_url) = std::env::var("CLIENT_BACKEND_URL") {
            self.backend_url = Some(backend_url);
        }
        if let Ok(audience) = std::env::var("CLIENT_BACKEND_AUDIENCE") {
            self.backend_audience = Some(audience);
        }
        if let Ok(profile_url) = std::env::var("CLIENT_PROFILE_BACKEND_URL") {
            self.profile_backend_url = Some(profile_url);
        }
        if let Ok(audience) = std::env::var("CLIENT_PROFILE_AUDIENCE") {
            self.profile_audience = Some(audience);
        }
    }

    /// Get the authority as a parsed URL.
    pub fn authority_url(&self) -> CoreResult<Url> {
        Url::parse(&self.authority).map_err(CoreError::from)
    }

    /// Get the absolute token exchange endpoint.
    pub fn token_exchange_uri(&self) -> CoreResult<Url> {
        let base = self.authority_url()?;
        base.join(&self.token_exchange_path).map_err(CoreError::from)
    }

    /// Whether token exchange is configured for this client.
    pub fn has_api_token_support(&self) -> bool {
        !self.token_exchange_path.is_empty()
    }
}

/// Interpret an environment value as a boolean.
///
/// `"false"`, `"0"` and the empty string are false; `"true"` and `"1"`
/// are true; anything else falls back to the default.
pub fn env_value_to_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some("") | Some("false") | Some("0") => false,
        Some("true") | Some("1") => true,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.authority, DEFAULT_AUTHORITY);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.callback_path, "/callback");
        assert!(config.auto_sign_in);
        assert!(config.automatic_silent_renew);
        assert!(!config.enable_logging);
        assert!(config.has_api_token_support());
    }

    #[test]
    fn test_empty_token_exchange_path_disables_api_tokens() {
        let mut config = ClientConfig::default();
        config.token_exchange_path = String::new();
        assert!(!config.has_api_token_support());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = ClientConfig::default();
        config.authority = "https://auth.example.com".to_string();
        config.api_audience = Some("https://api.example.com/backend".to_string());
        config.save(&paths).unwrap();

        let loaded = ClientConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.authority, "https://auth.example.com");
        assert_eq!(
            loaded.api_audience.as_deref(),
            Some("https://api.example.com/backend")
        );
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();

        std::fs::write(
            paths.config_file(),
            r#"{"authority": "https://auth.example.com"}"#,
        )
        .unwrap();

        let loaded = ClientConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.authority, "https://auth.example.com");
        assert_eq!(loaded.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(loaded.scope, ClientConfig::default().scope);
    }

    #[test]
    fn test_token_exchange_uri() {
        let mut config = ClientConfig::default();
        config.authority = "https://auth.example.com".to_string();

        let uri = config.token_exchange_uri().unwrap();
        assert_eq!(uri.as_str(), "https://auth.example.com/api-tokens/");
    }

    #[test]
    fn test_invalid_authority_url() {
        let mut config = ClientConfig::default();
        config.authority = "not a url".to_string();

        assert!(config.authority_url().is_err());
        assert!(config.token_exchange_uri().is_err());
    }

    #[test]
    fn test_env_value_to_bool() {
        assert!(!env_value_to_bool(Some(""), true));
        assert!(!env_value_to_bool(Some("false"), true));
        assert!(!env_value_to_bool(Some("0"), true));
        assert!(env_value_to_bool(Some("true"), false));
        assert!(env_value_to_bool(Some("1"), false));
        assert!(env_value_to_bool(Some("yes"), true));
        assert!(!env_value_to_bool(Some("yes"), false));
        assert!(env_value_to_bool(None, true));
        assert!(!env_value_to_bool(None, false));
    }
}
