use async_trait::async_trait;
use url::Url;

use super::{
    AuthError, AuthorizationResult, ClientRegistration, RedirectRequest, ServerConfig, TokenSet,
};

/// OAuth/OIDC operations the login flow depends on.
///
/// Network-bound operations are async and run on worker tasks; building the
/// redirect and parsing its callback are local and synchronous.
#[async_trait]
pub trait OidcProtocol: Send + Sync + 'static {
    async fn fetch_metadata(&self, issuer: &Url) -> Result<ServerConfig, AuthError>;

    async fn register_client(
        &self,
        configuration: &ServerConfig,
    ) -> Result<ClientRegistration, AuthError>;

    fn build_authorization_redirect(
        &self,
        configuration: &ServerConfig,
        registration: &ClientRegistration,
    ) -> Result<RedirectRequest, AuthError>;

    fn parse_authorization_callback(
        &self,
        callback: &str,
        request: &RedirectRequest,
    ) -> Result<AuthorizationResult, AuthError> {
        AuthorizationResult::from_callback(callback, request)
    }

    async fn exchange_code_for_tokens(
        &self,
        authorization: &AuthorizationResult,
        registration: &ClientRegistration,
    ) -> Result<TokenSet, AuthError>;
}
