use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Authorization server metadata from OpenID Connect discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_challenge_methods_supported: Vec<String>,
}

impl ServerConfig {
    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint,
            token_endpoint,
            registration_endpoint: None,
            userinfo_endpoint: None,
            end_session_endpoint: None,
            jwks_uri: None,
            scopes_supported: vec![],
            code_challenge_methods_supported: vec![],
        }
    }

    pub fn with_registration_endpoint(mut self, endpoint: Url) -> Self {
        self.registration_endpoint = Some(endpoint);
        self
    }
}

/// Result of RFC 7591 dynamic client registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    /// Zero means the secret does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_client_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ClientRegistration {
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_id_issued_at: None,
            client_secret_expires_at: None,
            registration_access_token: None,
            registration_client_uri: None,
            token_endpoint_auth_method: None,
            redirect_uris: vec![],
            extra: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_document_parses() {
        let config: ServerConfig = serde_json::from_value(serde_json::json!({
            "issuer": "https://idsvr.example.com/oauth",
            "authorization_endpoint": "https://idsvr.example.com/oauth/authorize",
            "token_endpoint": "https://idsvr.example.com/oauth/token",
            "registration_endpoint": "https://idsvr.example.com/oauth/register",
            "response_types_supported": ["code"],
            "code_challenge_methods_supported": ["S256", "plain"]
        }))
        .unwrap();
        assert_eq!(config.issuer, "https://idsvr.example.com/oauth");
        assert!(config.registration_endpoint.is_some());
        assert!(config.end_session_endpoint.is_none());
        assert_eq!(config.code_challenge_methods_supported, vec!["S256", "plain"]);
    }

    #[test]
    fn registration_keeps_unmodelled_fields() {
        let registration: ClientRegistration = serde_json::from_value(serde_json::json!({
            "client_id": "abc",
            "client_secret": "s3cret",
            "client_secret_expires_at": 0,
            "scope": "openid profile"
        }))
        .unwrap();
        assert_eq!(registration.client_id, "abc");
        assert_eq!(registration.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(registration.client_secret_expires_at, Some(0));
        assert_eq!(registration.extra["scope"], "openid profile");
    }
}
