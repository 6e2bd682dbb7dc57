mod controller;
mod error;
mod flow;
mod loopback;
mod metadata;
mod oidc;
mod pkce;
mod protocol;
mod request;
mod session_store;
mod state;
mod tokens;

pub use controller::{LoginFlowController, LoginView};
pub use error::{AuthError, FaultKind, IllegalStateError};
pub use flow::{launch_browser, AuthFlow, FlowPreference, InvalidFlow};
pub use loopback::CallbackListener;
pub use metadata::{ClientRegistration, ServerConfig};
pub use oidc::HttpOidcClient;
pub use pkce::PkcePair;
pub use protocol::OidcProtocol;
pub use request::{AuthorizationResult, RedirectRequest};
pub use session_store::{FileSessionStore, SessionStore};
pub use state::{AuthPhase, AuthSessionState, AuthState, PersistedSession};
pub use tokens::{TokenSet, TokenType};
