use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Broad category of an [`AuthError`], used by hosts to decide how to surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Network failure, server rejection, or malformed server response.
    Protocol,
    /// The authorization redirect reported cancellation or an authorization error.
    Callback,
    /// Local persistence or configuration failure.
    Storage,
}

/// Expected, recoverable failures from the protocol collaborator, the redirect
/// callback, and session persistence.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("local I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("request to authorization server failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} endpoint error {status}: {body}")]
    Endpoint {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("issuer mismatch: expected '{expected}', server reported '{actual}'")]
    IssuerMismatch { expected: String, actual: String },
    #[error("{0}")]
    Protocol(String),
    #[error("unsupported token_type `{0}` in token response")]
    InvalidTokenType(String),
    #[error("no refresh token is stored for this session")]
    RefreshUnavailable,
    #[error("malformed URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("login step abandoned before it could complete")]
    Cancelled,
    #[error("login step stopped unexpectedly: {0}")]
    WorkerFailed(String),
    #[error("authorization server refused the request: {0}")]
    AccessDenied(String),
    #[error("redirect did not carry an authorization code")]
    MissingAuthorizationCode,
    #[error("redirect state does not match the pending request")]
    StateMismatch,
    #[error("could not open a browser: {0}")]
    BrowserLaunch(String),
    #[error("unreadable authorization redirect: {0}")]
    InvalidAuthorizationResponse(String),
    #[error("redirect URI '{0}' cannot be served on a local listener")]
    UnsupportedRedirect(String),
}

impl AuthError {
    pub fn kind(&self) -> FaultKind {
        match self {
            AuthError::Config(_)
            | AuthError::Io(_)
            | AuthError::Serde(_)
            | AuthError::UnsupportedRedirect(_) => FaultKind::Storage,
            AuthError::Cancelled
            | AuthError::AccessDenied(_)
            | AuthError::MissingAuthorizationCode
            | AuthError::StateMismatch
            | AuthError::BrowserLaunch(_)
            | AuthError::InvalidAuthorizationResponse(_) => FaultKind::Callback,
            AuthError::Http(_)
            | AuthError::Endpoint { .. }
            | AuthError::IssuerMismatch { .. }
            | AuthError::Protocol(_)
            | AuthError::InvalidTokenType(_)
            | AuthError::RefreshUnavailable
            | AuthError::WorkerFailed(_)
            | AuthError::Url(_) => FaultKind::Protocol,
        }
    }
}

/// Session data was read, or a flow step was requested, out of sequence.
///
/// This signals a defect in the caller rather than a runtime condition, so it
/// is never routed to the presentation layer's error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IllegalStateError {
    #[error("Configuration not set")]
    ConfigurationNotSet,
    #[error("Not registered")]
    NotRegistered,
    #[error("Authorization not started")]
    AuthorizationNotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kinds() {
        assert_eq!(AuthError::StateMismatch.kind(), FaultKind::Callback);
        assert_eq!(
            AuthError::AccessDenied("access_denied".into()).kind(),
            FaultKind::Callback
        );
        assert_eq!(
            AuthError::Protocol("no registration endpoint".into()).kind(),
            FaultKind::Protocol
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(AuthError::Io(io).kind(), FaultKind::Storage);
    }

    #[test]
    fn illegal_state_messages() {
        assert_eq!(
            IllegalStateError::ConfigurationNotSet.to_string(),
            "Configuration not set"
        );
        assert_eq!(IllegalStateError::NotRegistered.to_string(), "Not registered");
    }
}
