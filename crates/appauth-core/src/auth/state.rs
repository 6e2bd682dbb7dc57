//! Authentication session state and its transitions.
//!
//! The session moves through `Empty → Configured → Registered → LoggedIn`.
//! Setting a configuration is the only transition that discards everything;
//! logout drops tokens but keeps configuration and registration so that a
//! later login does not need to register again.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ClientRegistration, IllegalStateError, ServerConfig, TokenSet};

/// Which parts of the session are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Empty,
    Configured,
    Registered,
    LoggedIn,
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            AuthPhase::Empty => "empty",
            AuthPhase::Configured => "configured",
            AuthPhase::Registered => "registered",
            AuthPhase::LoggedIn => "logged-in",
        };
        write!(f, "{value}")
    }
}

/// Tagged session state. Registration cannot exist without configuration and
/// tokens cannot exist without registration.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AuthState {
    #[default]
    Empty,
    Configured {
        configuration: ServerConfig,
    },
    Registered {
        configuration: ServerConfig,
        registration: ClientRegistration,
    },
    LoggedIn {
        configuration: ServerConfig,
        registration: ClientRegistration,
        tokens: TokenSet,
    },
}

impl AuthState {
    pub fn phase(&self) -> AuthPhase {
        match self {
            AuthState::Empty => AuthPhase::Empty,
            AuthState::Configured { .. } => AuthPhase::Configured,
            AuthState::Registered { .. } => AuthPhase::Registered,
            AuthState::LoggedIn { .. } => AuthPhase::LoggedIn,
        }
    }

    pub fn configuration(&self) -> Option<&ServerConfig> {
        match self {
            AuthState::Empty => None,
            AuthState::Configured { configuration }
            | AuthState::Registered { configuration, .. }
            | AuthState::LoggedIn { configuration, .. } => Some(configuration),
        }
    }

    pub fn registration(&self) -> Option<&ClientRegistration> {
        match self {
            AuthState::Registered { registration, .. }
            | AuthState::LoggedIn { registration, .. } => Some(registration),
            _ => None,
        }
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        match self {
            AuthState::LoggedIn { tokens, .. } => Some(tokens),
            _ => None,
        }
    }

    /// A fresh session seeded only with `configuration`.
    pub fn configured(configuration: ServerConfig) -> AuthState {
        AuthState::Configured { configuration }
    }

    /// Attach a registration, keeping any tokens already present.
    pub fn with_registration(
        &self,
        registration: ClientRegistration,
    ) -> Result<AuthState, IllegalStateError> {
        let configuration = self
            .configuration()
            .cloned()
            .ok_or(IllegalStateError::ConfigurationNotSet)?;
        Ok(match self.tokens() {
            Some(tokens) => AuthState::LoggedIn {
                configuration,
                registration,
                tokens: tokens.clone(),
            },
            None => AuthState::Registered {
                configuration,
                registration,
            },
        })
    }

    /// Store tokens, merging with any already held.
    pub fn with_tokens(&self, tokens: TokenSet) -> Result<AuthState, IllegalStateError> {
        let configuration = self
            .configuration()
            .cloned()
            .ok_or(IllegalStateError::ConfigurationNotSet)?;
        let registration = self
            .registration()
            .cloned()
            .ok_or(IllegalStateError::NotRegistered)?;
        let tokens = match self.tokens() {
            Some(existing) => existing.clone().merge(tokens),
            None => tokens,
        };
        Ok(AuthState::LoggedIn {
            configuration,
            registration,
            tokens,
        })
    }

    /// Drop tokens, keeping configuration and registration.
    pub fn without_tokens(&self) -> AuthState {
        match self {
            AuthState::LoggedIn {
                configuration,
                registration,
                ..
            } => AuthState::Registered {
                configuration: configuration.clone(),
                registration: registration.clone(),
            },
            other => other.clone(),
        }
    }

    /// Rebuild a state from independently persisted parts.
    ///
    /// Parts that cannot exist without an absent predecessor are dropped.
    pub fn from_parts(
        configuration: Option<ServerConfig>,
        registration: Option<ClientRegistration>,
        tokens: Option<TokenSet>,
    ) -> AuthState {
        match (configuration, registration, tokens) {
            (None, registration, tokens) => {
                if registration.is_some() || tokens.is_some() {
                    warn!("discarding persisted registration/tokens without a configuration");
                }
                AuthState::Empty
            }
            (Some(configuration), None, tokens) => {
                if tokens.is_some() {
                    warn!("discarding persisted tokens without a registration");
                }
                AuthState::Configured { configuration }
            }
            (Some(configuration), Some(registration), None) => AuthState::Registered {
                configuration,
                registration,
            },
            (Some(configuration), Some(registration), Some(tokens)) => AuthState::LoggedIn {
                configuration,
                registration,
                tokens,
            },
        }
    }
}

/// Independently serializable parts of a session, as written to storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedSession {
    #[serde(default)]
    pub configuration: Option<ServerConfig>,
    #[serde(default)]
    pub registration: Option<ClientRegistration>,
    #[serde(default)]
    pub tokens: Option<TokenSet>,
}

/// Owner of the single authentication session for a host process.
///
/// All reads and writes go through these operations; the host constructs one
/// instance at startup and hands it to the login flow.
#[derive(Debug, Clone, Default)]
pub struct AuthSessionState {
    state: AuthState,
}

impl AuthSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(persisted: PersistedSession) -> Self {
        Self {
            state: AuthState::from_parts(
                persisted.configuration,
                persisted.registration,
                persisted.tokens,
            ),
        }
    }

    pub fn snapshot(&self) -> PersistedSession {
        PersistedSession {
            configuration: self.state.configuration().cloned(),
            registration: self.state.registration().cloned(),
            tokens: self.state.tokens().cloned(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.phase()
    }

    pub fn server_configuration(&self) -> Result<&ServerConfig, IllegalStateError> {
        self.state
            .configuration()
            .ok_or(IllegalStateError::ConfigurationNotSet)
    }

    /// Replace the whole session with one seeded only by `configuration`.
    ///
    /// Registration and tokens issued against a previous configuration are discarded.
    pub fn set_server_configuration(&mut self, configuration: ServerConfig) {
        debug!(issuer = %configuration.issuer, "session reset with new server configuration");
        self.state = AuthState::configured(configuration);
    }

    pub fn registration(&self) -> Result<&ClientRegistration, IllegalStateError> {
        self.state
            .registration()
            .ok_or(IllegalStateError::NotRegistered)
    }

    pub fn set_registration(
        &mut self,
        registration: ClientRegistration,
    ) -> Result<(), IllegalStateError> {
        debug!(client_id = %registration.client_id, "storing client registration");
        self.state = self.state.with_registration(registration)?;
        Ok(())
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        self.state.tokens()
    }

    /// Store (`Some`) or clear (`None`) the current tokens.
    ///
    /// Clearing keeps configuration and registration.
    pub fn set_tokens(&mut self, tokens: Option<TokenSet>) -> Result<(), IllegalStateError> {
        self.state = match tokens {
            Some(tokens) => self.state.with_tokens(tokens)?,
            None => {
                debug!("clearing tokens");
                self.state.without_tokens()
            }
        };
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.state.registration().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn config(issuer: &str) -> ServerConfig {
        ServerConfig::new(
            issuer,
            Url::parse(&format!("{issuer}/authorize")).unwrap(),
            Url::parse(&format!("{issuer}/token")).unwrap(),
        )
    }

    fn registered(issuer: &str, client_id: &str) -> AuthSessionState {
        let mut session = AuthSessionState::new();
        session.set_server_configuration(config(issuer));
        session
            .set_registration(ClientRegistration::public(client_id))
            .unwrap();
        session
    }

    #[test]
    fn empty_session_faults_on_reads() {
        let session = AuthSessionState::new();
        assert_eq!(
            session.server_configuration().unwrap_err(),
            IllegalStateError::ConfigurationNotSet
        );
        assert_eq!(
            session.registration().unwrap_err(),
            IllegalStateError::NotRegistered
        );
        assert!(session.tokens().is_none());
        assert!(!session.is_registered());
        assert_eq!(session.phase(), AuthPhase::Empty);
    }

    #[test]
    fn registration_requires_configuration() {
        let mut session = AuthSessionState::new();
        let err = session
            .set_registration(ClientRegistration::public("client"))
            .unwrap_err();
        assert_eq!(err, IllegalStateError::ConfigurationNotSet);
        assert!(session.registration().is_err());
        assert!(!session.is_registered());
    }

    #[test]
    fn tokens_require_registration() {
        let mut session = AuthSessionState::new();
        assert_eq!(
            session.set_tokens(Some(TokenSet::bearer("t"))).unwrap_err(),
            IllegalStateError::ConfigurationNotSet
        );
        session.set_server_configuration(config("https://a.example"));
        assert_eq!(
            session.set_tokens(Some(TokenSet::bearer("t"))).unwrap_err(),
            IllegalStateError::NotRegistered
        );
        assert_eq!(session.phase(), AuthPhase::Configured);
    }

    #[test]
    fn logout_preserves_configuration_and_registration() {
        let mut session = registered("https://a.example", "client");
        session
            .set_tokens(Some(TokenSet::bearer("access").with_refresh_token("refresh")))
            .unwrap();
        assert_eq!(session.phase(), AuthPhase::LoggedIn);

        session.set_tokens(None).unwrap();

        assert!(session.tokens().is_none());
        assert_eq!(
            session.server_configuration().unwrap(),
            &config("https://a.example")
        );
        assert_eq!(
            session.registration().unwrap(),
            &ClientRegistration::public("client")
        );
        assert_eq!(session.phase(), AuthPhase::Registered);
    }

    #[test]
    fn new_configuration_resets_registration_and_tokens() {
        let mut session = registered("https://a.example", "client");
        session.set_tokens(Some(TokenSet::bearer("access"))).unwrap();

        session.set_server_configuration(config("https://b.example"));

        assert_eq!(
            session.server_configuration().unwrap(),
            &config("https://b.example")
        );
        assert!(session.registration().is_err());
        assert!(session.tokens().is_none());
        assert!(!session.is_registered());
    }

    #[test]
    fn re_registration_keeps_tokens() {
        let mut session = registered("https://a.example", "client");
        session.set_tokens(Some(TokenSet::bearer("access"))).unwrap();
        session
            .set_registration(ClientRegistration::public("client-2"))
            .unwrap();
        assert_eq!(session.registration().unwrap().client_id, "client-2");
        assert_eq!(session.tokens().unwrap().access_token, "access");
    }

    #[test]
    fn token_updates_merge() {
        let mut session = registered("https://a.example", "client");
        session
            .set_tokens(Some(
                TokenSet::bearer("access-1")
                    .with_refresh_token("refresh")
                    .with_id_token("id"),
            ))
            .unwrap();
        session.set_tokens(Some(TokenSet::bearer("access-2"))).unwrap();
        let tokens = session.tokens().unwrap();
        assert_eq!(tokens.access_token, "access-2");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(tokens.id_token.as_deref(), Some("id"));
    }

    #[test]
    fn clearing_tokens_on_partial_sessions_is_a_no_op() {
        let mut session = AuthSessionState::new();
        session.set_tokens(None).unwrap();
        assert_eq!(session.phase(), AuthPhase::Empty);

        session.set_server_configuration(config("https://a.example"));
        session.set_tokens(None).unwrap();
        assert_eq!(session.phase(), AuthPhase::Configured);
    }

    #[test]
    fn snapshot_and_restore() {
        let mut session = registered("https://a.example", "client");
        session.set_tokens(Some(TokenSet::bearer("access"))).unwrap();
        let restored = AuthSessionState::restore(session.snapshot());
        assert_eq!(restored.state(), session.state());
    }

    #[test]
    fn restore_drops_orphaned_parts() {
        let orphaned = PersistedSession {
            configuration: None,
            registration: Some(ClientRegistration::public("client")),
            tokens: Some(TokenSet::bearer("access")),
        };
        assert_eq!(AuthSessionState::restore(orphaned).phase(), AuthPhase::Empty);

        let tokens_only = PersistedSession {
            configuration: Some(config("https://a.example")),
            registration: None,
            tokens: Some(TokenSet::bearer("access")),
        };
        let restored = AuthSessionState::restore(tokens_only);
        assert_eq!(restored.phase(), AuthPhase::Configured);
        assert!(restored.tokens().is_none());
    }

    #[test]
    fn lifecycle_through_relogin() {
        let mut session = AuthSessionState::new();
        let mut phases = vec![session.phase()];
        session.set_server_configuration(config("https://a.example"));
        phases.push(session.phase());
        session
            .set_registration(ClientRegistration::public("client"))
            .unwrap();
        phases.push(session.phase());
        session.set_tokens(Some(TokenSet::bearer("one"))).unwrap();
        phases.push(session.phase());
        session.set_tokens(None).unwrap();
        phases.push(session.phase());
        session.set_tokens(Some(TokenSet::bearer("two"))).unwrap();
        phases.push(session.phase());

        assert_eq!(
            phases,
            vec![
                AuthPhase::Empty,
                AuthPhase::Configured,
                AuthPhase::Registered,
                AuthPhase::LoggedIn,
                AuthPhase::Registered,
                AuthPhase::LoggedIn,
            ]
        );
        assert_eq!(session.tokens().unwrap().access_token, "two");
    }
}
