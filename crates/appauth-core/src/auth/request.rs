use serde::{Deserialize, Serialize};
use url::Url;

use super::AuthError;

/// Everything needed to launch the user-interaction step and later validate
/// and redeem its callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectRequest {
    pub authorization_url: Url,
    pub redirect_uri: Url,
    pub token_endpoint: Url,
    pub client_id: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

/// A validated authorization response, ready to be exchanged for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub code: String,
    pub request: RedirectRequest,
}

impl AuthorizationResult {
    /// Validate a redirect callback URL against the request that produced it.
    pub fn from_callback(callback: &str, request: &RedirectRequest) -> Result<Self, AuthError> {
        let callback = callback.trim();
        if callback.is_empty() {
            return Err(AuthError::InvalidAuthorizationResponse(
                "empty callback".into(),
            ));
        }
        let url = Url::parse(callback).map_err(|err| {
            AuthError::InvalidAuthorizationResponse(format!("expected redirect URL: {err}"))
        })?;

        let mut code: Option<String> = None;
        let mut state: Option<String> = None;
        let mut error: Option<String> = None;
        let mut description: Option<String> = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            return Err(AuthError::AccessDenied(match description {
                Some(detail) => format!("{err}: {detail}"),
                None => err,
            }));
        }

        if state.as_deref() != Some(request.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let code = code.ok_or(AuthError::MissingAuthorizationCode)?;
        Ok(Self {
            code,
            request: request.clone(),
        })
    }
}
