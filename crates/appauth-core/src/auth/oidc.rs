use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info};
use url::{form_urlencoded, Url};

use super::pkce::{random_urlsafe, CHALLENGE_METHOD};
use super::{
    AuthError, AuthorizationResult, ClientRegistration, OidcProtocol, PkcePair, RedirectRequest,
    ServerConfig, TokenSet, TokenType,
};
use crate::config::ClientConfig;

const DEFAULT_USER_AGENT: &str = "appauth-rs/0.1.0";
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// `reqwest`-backed OpenID Connect client: discovery, dynamic registration,
/// authorization code + PKCE, and the refresh grant.
#[derive(Debug, Clone)]
pub struct HttpOidcClient {
    http: Client,
    config: ClientConfig,
}

impl HttpOidcClient {
    pub fn new(config: ClientConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    /// Discovery document location for `issuer` (path appended, per OIDC Discovery 1.0).
    pub fn discovery_url(issuer: &Url) -> Result<Url, AuthError> {
        let base = issuer.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{DISCOVERY_PATH}"))?)
    }

    /// Redeem the stored refresh token for a new token set.
    ///
    /// The returned set is already merged with `existing`, so a server that
    /// does not rotate refresh tokens leaves the previous one in place.
    pub async fn refresh_tokens(
        &self,
        configuration: &ServerConfig,
        registration: &ClientRegistration,
        existing: &TokenSet,
    ) -> Result<TokenSet, AuthError> {
        let refresh_token = existing
            .refresh_token
            .as_ref()
            .ok_or(AuthError::RefreshUnavailable)?;

        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];

        info!(client_id = %registration.client_id, "refreshing tokens");
        let refreshed = self
            .token_request(&configuration.token_endpoint, registration, form)
            .await?;
        Ok(existing.clone().merge(refreshed))
    }

    async fn token_request(
        &self,
        token_endpoint: &Url,
        registration: &ClientRegistration,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<TokenSet, AuthError> {
        let request = self.http.post(token_endpoint.clone());
        let request = authenticate_client(request, registration, &mut form);
        let response = request.form(&form).send().await?;
        handle_token_response(response).await
    }
}

/// Apply the client authentication method chosen at registration.
fn authenticate_client(
    request: RequestBuilder,
    registration: &ClientRegistration,
    form: &mut Vec<(&'static str, String)>,
) -> RequestBuilder {
    let method = registration.token_endpoint_auth_method.as_deref();
    match (&registration.client_secret, method) {
        (None, _) | (Some(_), Some("none")) => {
            form.push(("client_id", registration.client_id.clone()));
            request
        }
        (Some(secret), Some("client_secret_post")) => {
            form.push(("client_id", registration.client_id.clone()));
            form.push(("client_secret", secret.clone()));
            request
        }
        // RFC 7591 defaults to client_secret_basic when the method is omitted.
        (Some(secret), _) => request.basic_auth(
            form_encode(&registration.client_id),
            Some(form_encode(secret)),
        ),
    }
}

/// RFC 6749 section 2.3.1 encodes credentials before they enter the Basic header.
fn form_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl OidcProtocol for HttpOidcClient {
    async fn fetch_metadata(&self, issuer: &Url) -> Result<ServerConfig, AuthError> {
        let url = Self::discovery_url(issuer)?;
        info!(%url, "fetching server metadata");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint {
                endpoint: "discovery",
                status,
                body,
            });
        }

        let configuration: ServerConfig = response.json().await?;
        let expected = issuer.as_str().trim_end_matches('/');
        if configuration.issuer.trim_end_matches('/') != expected {
            return Err(AuthError::IssuerMismatch {
                expected: expected.to_owned(),
                actual: configuration.issuer,
            });
        }
        Ok(configuration)
    }

    async fn register_client(
        &self,
        configuration: &ServerConfig,
    ) -> Result<ClientRegistration, AuthError> {
        let endpoint = configuration.registration_endpoint.clone().ok_or_else(|| {
            AuthError::Protocol(format!(
                "issuer {} does not advertise a registration endpoint",
                configuration.issuer
            ))
        })?;

        let body = serde_json::json!({
            "client_name": self.config.client_name,
            "redirect_uris": [self.config.redirect_uri.as_str()],
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "scope": self.config.scopes.join(" "),
        });

        info!(%endpoint, "registering client");
        let response = self.http.post(endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint {
                endpoint: "registration",
                status,
                body,
            });
        }

        let registration: ClientRegistration = response.json().await?;
        debug!(client_id = %registration.client_id, "client registered");
        Ok(registration)
    }

    fn build_authorization_redirect(
        &self,
        configuration: &ServerConfig,
        registration: &ClientRegistration,
    ) -> Result<RedirectRequest, AuthError> {
        let pkce = PkcePair::generate();
        let state = random_urlsafe(24);
        let nonce = random_urlsafe(24);

        let mut url = configuration.authorization_endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("response_type", "code");
            pairs.append_pair("client_id", &registration.client_id);
            pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
            if !self.config.scopes.is_empty() {
                pairs.append_pair("scope", &self.config.scopes.join(" "));
            }
            pairs.append_pair("state", &state);
            pairs.append_pair("nonce", &nonce);
            pairs.append_pair("code_challenge", pkce.challenge());
            pairs.append_pair("code_challenge_method", CHALLENGE_METHOD);
        }

        Ok(RedirectRequest {
            authorization_url: url,
            redirect_uri: self.config.redirect_uri.clone(),
            token_endpoint: configuration.token_endpoint.clone(),
            client_id: registration.client_id.clone(),
            state,
            nonce,
            code_verifier: pkce.verifier().to_owned(),
        })
    }

    async fn exchange_code_for_tokens(
        &self,
        authorization: &AuthorizationResult,
        registration: &ClientRegistration,
    ) -> Result<TokenSet, AuthError> {
        let request = &authorization.request;
        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", authorization.code.clone()),
            ("redirect_uri", request.redirect_uri.to_string()),
            ("code_verifier", request.code_verifier.clone()),
        ];

        info!(client_id = %registration.client_id, "exchanging authorization code");
        self.token_request(&request.token_endpoint, registration, form)
            .await
    }
}

async fn handle_token_response(response: reqwest::Response) -> Result<TokenSet, AuthError> {
    let status = response.status();
    let received_at = Utc::now();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Endpoint {
            endpoint: "token",
            status,
            body,
        });
    }

    let payload: TokenResponse = response.json().await?;
    payload.into_token_set(received_at)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    token_type: String,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, received_at: DateTime<Utc>) -> Result<TokenSet, AuthError> {
        let token_type = match self.token_type.to_ascii_lowercase().as_str() {
            "bearer" => TokenType::Bearer,
            "dpop" => TokenType::DPoP,
            other => return Err(AuthError::InvalidTokenType(other.to_owned())),
        };

        let expires_at = match self.expires_in {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|lifetime| received_at.checked_add_signed(lifetime))
                    .ok_or_else(|| AuthError::Protocol("expires_in out of range".into()))?,
            ),
            None => None,
        };

        let scope = self
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();

        Ok(TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            token_type,
            expires_at,
            scope,
            received_at,
        })
    }
}
